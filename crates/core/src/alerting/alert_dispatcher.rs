use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::alerting::domain::alert_event::{AlertEvent, CooldownKey};
use crate::alerting::domain::alert_sink::AlertSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Cooldown started and the sink accepted the event.
    Emitted,
    /// Key still cooling down; event dropped.
    Suppressed,
    /// Cooldown started but the sink rejected the event.
    DeliveryFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub emitted: u64,
    pub suppressed: u64,
    pub delivery_failed: u64,
}

type CooldownSlot = Arc<Mutex<Option<Instant>>>;

/// Debounces alerts per (camera, identity) pair.
///
/// The outer map lock is held only to look up a key's slot; the accept or
/// suppress decision happens under that slot's own lock, so dispatches on
/// different keys never contend. Delivery happens after both locks are
/// released and a failed delivery keeps the cooldown that was started.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    cooldown: Duration,
    slots: Mutex<HashMap<CooldownKey, CooldownSlot>>,
    emitted: AtomicU64,
    suppressed: AtomicU64,
    delivery_failed: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, cooldown: Duration) -> Self {
        Self {
            sink,
            cooldown,
            slots: Mutex::new(HashMap::new()),
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            delivery_failed: AtomicU64::new(0),
        }
    }

    /// Emits `event` unless its key alerted less than one cooldown window
    /// before `observed_at`.
    pub fn dispatch(&self, event: &AlertEvent, observed_at: Instant) -> DispatchOutcome {
        let slot = self.slot(event.cooldown_key());
        {
            let mut last = slot.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = *last {
                if observed_at.saturating_duration_since(previous) < self.cooldown {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "Suppressed alert for {} on {} (cooling down)",
                        event.identity_id,
                        event.camera_id
                    );
                    return DispatchOutcome::Suppressed;
                }
            }
            *last = Some(observed_at);
        }

        match self.sink.deliver(event) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Emitted
            }
            Err(e) => {
                self.delivery_failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Alert delivery failed for {} on {}: {e}",
                    event.identity_id,
                    event.camera_id
                );
                DispatchOutcome::DeliveryFailed
            }
        }
    }

    /// Forgets every cooldown; the next match on any key alerts again.
    pub fn clear_cooldowns(&self) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        log::info!("Alert cooldowns cleared");
    }

    pub fn tracked_keys(&self) -> Vec<CooldownKey> {
        let mut keys: Vec<CooldownKey> = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: CooldownKey) -> CooldownSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key).or_default())
    }
}
