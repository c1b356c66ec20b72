use std::sync::Arc;

use crate::alerting::domain::alert_event::AlertEvent;
use crate::alerting::domain::alert_sink::{AlertSink, SinkError};

/// Delivers every alert to each inner sink; fails if any of them fails.
pub struct FanoutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanoutAlertSink {
    fn deliver(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let errors: Vec<String> = self
            .sinks
            .iter()
            .filter_map(|sink| sink.deliver(event).err().map(|e| e.to_string()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Partial {
                failed: errors.len(),
                total: self.sinks.len(),
                details: errors.join("; "),
            })
        }
    }
}
