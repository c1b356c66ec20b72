pub mod fanout_alert_sink;
pub mod http_alert_sink;
pub mod log_alert_sink;
