use thiserror::Error;

use crate::alerting::domain::alert_event::AlertEvent;
use crate::shared::source_error::SourceError;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Http(#[from] SourceError),
    #[error("{failed} of {total} sinks rejected the alert: {details}")]
    Partial {
        failed: usize,
        total: usize,
        details: String,
    },
    #[error("{0}")]
    Rejected(String),
}

/// Receives accepted alerts. One call per emitted event, no retries.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, event: &AlertEvent) -> Result<(), SinkError>;
}
