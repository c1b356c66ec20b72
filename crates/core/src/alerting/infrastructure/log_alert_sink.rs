use std::sync::Mutex;

use crate::alerting::domain::alert_event::AlertEvent;
use crate::alerting::domain::alert_sink::{AlertSink, SinkError};

/// Logs each alert as a warning banner and keeps an in-memory history.
#[derive(Default)]
pub struct LogAlertSink {
    history: Mutex<Vec<AlertEvent>>,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<AlertEvent> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for LogAlertSink {
    fn deliver(&self, event: &AlertEvent) -> Result<(), SinkError> {
        log::warn!(
            "MATCH: {} ({}) on {} at {} | similarity {:.1}% | {}",
            event.display_name,
            event.identity_id,
            event.camera_name,
            event.camera_location,
            event.similarity * 100.0,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
        self.history
            .lock()
            .map_err(|e| SinkError::Rejected(format!("Lock poisoned: {e}")))?
            .push(event.clone());
        Ok(())
    }
}
