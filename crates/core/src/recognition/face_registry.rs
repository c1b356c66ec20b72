use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::recognition::domain::identity::IdentityRecord;
use crate::recognition::domain::registry_snapshot::{RegistrySnapshot, SnapshotOrigin};
use crate::recognition::domain::registry_source::RegistrySource;
use crate::shared::source_error::SourceError;

/// Result of one [`FaceRegistry::load`] attempt.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Snapshot replaced from the primary source with this many records.
    Primary(usize),
    /// Primary unreachable; snapshot built from the fallback source.
    Degraded(usize),
    /// Nothing usable was fetched; the previous snapshot is still current.
    Retained(SourceError),
    /// Every fetched record had the wrong embedding width; the previous
    /// snapshot is still current.
    Rejected(DimensionMismatch),
}

/// The source serves embeddings of another model than the configured one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("none of {records} records has a {expected}-d embedding (found {found}-d)")]
pub struct DimensionMismatch {
    pub records: usize,
    pub found: usize,
    pub expected: usize,
}

/// Holds the current identity snapshot and refreshes it from its sources.
///
/// Readers get an `Arc` to a complete snapshot and never wait on network
/// I/O; a refresh builds the next snapshot off to the side and swaps the
/// pointer in one write.
pub struct FaceRegistry {
    primary: Arc<dyn RegistrySource>,
    fallback: Option<Arc<dyn RegistrySource>>,
    dimension: usize,
    refresh_interval: Duration,
    current: RwLock<Arc<RegistrySnapshot>>,
    generation: AtomicU64,
    last_attempt: Mutex<Option<Instant>>,
    refresh_requested: AtomicBool,
    loading: Mutex<()>,
}

impl FaceRegistry {
    pub fn new(primary: Arc<dyn RegistrySource>, dimension: usize, refresh_interval: Duration) -> Self {
        Self {
            primary,
            fallback: None,
            dimension,
            refresh_interval,
            current: RwLock::new(Arc::new(RegistrySnapshot::empty(dimension))),
            generation: AtomicU64::new(0),
            last_attempt: Mutex::new(None),
            refresh_requested: AtomicBool::new(false),
            loading: Mutex::new(()),
        }
    }

    /// Source consulted while the primary has never produced a snapshot.
    pub fn with_fallback(mut self, fallback: Arc<dyn RegistrySource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The last successfully loaded snapshot (empty before the first load).
    pub fn current(&self) -> Arc<RegistrySnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Fetches identities and swaps in a new snapshot.
    ///
    /// Failures are reported through the outcome; the current snapshot is
    /// only ever replaced by a complete one.
    pub fn load(&self) -> LoadOutcome {
        let _loading = self.loading.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh_requested.store(false, Ordering::SeqCst);
        *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let primary_error = match self.primary.fetch() {
            Ok(records) => {
                return match self.install(records, self.primary.as_ref()) {
                    Ok(count) => LoadOutcome::Primary(count),
                    Err(mismatch) => LoadOutcome::Rejected(mismatch),
                };
            }
            Err(e) => e,
        };
        log::warn!("{} unavailable: {primary_error}", self.primary.name());

        let Some(fallback) = self.fallback.as_ref() else {
            return self.retained(primary_error);
        };
        if self.current().origin() == SnapshotOrigin::Primary {
            return self.retained(primary_error);
        }

        match fallback.fetch() {
            Ok(records) => {
                log::warn!(
                    "Using degraded source: {} ({} candidate records)",
                    fallback.name(),
                    records.len()
                );
                match self.install(records, fallback.as_ref()) {
                    Ok(count) => LoadOutcome::Degraded(count),
                    Err(mismatch) => LoadOutcome::Rejected(mismatch),
                }
            }
            Err(e) => {
                log::warn!("Degraded source {} also failed: {e}", fallback.name());
                self.retained(primary_error)
            }
        }
    }

    /// True when the refresh interval has elapsed since the last attempt or
    /// a manual refresh is pending.
    pub fn needs_refresh(&self, now: Instant) -> bool {
        if self.refresh_requested.load(Ordering::SeqCst) {
            return true;
        }
        match *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner()) {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.refresh_interval,
        }
    }

    /// Marks the registry for reload on the supervisor's next tick.
    pub fn request_refresh(&self) {
        self.refresh_requested.store(true, Ordering::SeqCst);
    }

    fn retained(&self, error: SourceError) -> LoadOutcome {
        let current = self.current();
        log::warn!(
            "Keeping registry generation {} ({} records)",
            current.generation(),
            current.len()
        );
        LoadOutcome::Retained(error)
    }

    fn install(
        &self,
        records: Vec<IdentityRecord>,
        source: &dyn RegistrySource,
    ) -> Result<usize, DimensionMismatch> {
        let origin = if source.is_degraded() {
            SnapshotOrigin::Degraded
        } else {
            SnapshotOrigin::Primary
        };
        let fetched = records.len();
        if let Some(found) = foreign_dimension(&records, self.dimension) {
            let mismatch = DimensionMismatch {
                records: fetched,
                found,
                expected: self.dimension,
            };
            log::error!("Registry source {} rejected: {mismatch}", source.name());
            return Err(mismatch);
        }
        let usable: Vec<IdentityRecord> = records
            .into_iter()
            .filter(|r| {
                let ok = r.embedding.dimension() == self.dimension && r.embedding.is_finite();
                if !ok {
                    log::warn!(
                        "Skipping record for {} ({}): {}-d embedding, expected {}-d",
                        r.display_name,
                        r.identity_id,
                        r.embedding.dimension(),
                        self.dimension
                    );
                }
                ok
            })
            .collect();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = RegistrySnapshot::new(usable, self.dimension, origin, generation);
        let count = snapshot.len();
        log::info!(
            "Registry loaded from {}: {count} of {fetched} records, {} identities (generation {generation})",
            source.name(),
            snapshot.identity_count()
        );

        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        Ok(count)
    }
}

/// The first record's dimension when no record has the `expected` one.
fn foreign_dimension(records: &[IdentityRecord], expected: usize) -> Option<usize> {
    if records.iter().any(|r| r.embedding.dimension() == expected) {
        return None;
    }
    records.first().map(|r| r.embedding.dimension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::embedding::Embedding;
    use crate::recognition::domain::identity::IdentityId;

    /// Serves scripted responses, repeating the last one.
    struct ScriptedSource {
        name: &'static str,
        degraded: bool,
        responses: Mutex<Vec<Result<Vec<IdentityRecord>, String>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<IdentityRecord>, String>>) -> Self {
            Self {
                name: "scripted",
                degraded: false,
                responses: Mutex::new(responses),
            }
        }

        fn degraded(responses: Vec<Result<Vec<IdentityRecord>, String>>) -> Self {
            Self {
                name: "local",
                degraded: true,
                ..Self::new(responses)
            }
        }
    }

    impl RegistrySource for ScriptedSource {
        fn fetch(&self) -> Result<Vec<IdentityRecord>, SourceError> {
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            next.map_err(SourceError::Unavailable)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn is_degraded(&self) -> bool {
            self.degraded
        }
    }

    fn record(id: &str, values: &[f32]) -> IdentityRecord {
        IdentityRecord::new(IdentityId::new(id), id, Embedding::new(values.to_vec()))
    }

    fn registry(source: ScriptedSource) -> FaceRegistry {
        FaceRegistry::new(Arc::new(source), 2, Duration::from_secs(30))
    }

    #[test]
    fn test_current_is_empty_before_first_load() {
        let reg = registry(ScriptedSource::new(vec![Ok(vec![])]));
        let snap = reg.current();
        assert!(snap.is_empty());
        assert_eq!(snap.origin(), SnapshotOrigin::Empty);
    }

    #[test]
    fn test_load_filters_wrong_dimension_records() {
        let reg = registry(ScriptedSource::new(vec![Ok(vec![
            record("a", &[0.1, 0.2]),
            record("b", &[0.1, 0.2, 0.3]),
            record("c", &[f32::NAN, 0.0]),
            record("a", &[0.3, 0.4]),
        ])]));
        assert!(matches!(reg.load(), LoadOutcome::Primary(2)));
        let snap = reg.current();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.identity_count(), 1);
        assert_eq!(snap.generation(), 1);
    }

    #[test]
    fn test_source_of_another_dimension_is_rejected() {
        let reg = registry(ScriptedSource::new(vec![
            Ok(vec![record("a", &[0.1, 0.2])]),
            Ok(vec![record("b", &[0.0; 128]), record("c", &[0.5; 128])]),
        ]));
        reg.load();
        let before = reg.current();

        match reg.load() {
            LoadOutcome::Rejected(mismatch) => assert_eq!(
                mismatch,
                DimensionMismatch {
                    records: 2,
                    found: 128,
                    expected: 2
                }
            ),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(Arc::ptr_eq(&before, &reg.current()));
    }

    #[test]
    fn test_mixed_dimensions_skip_only_bad_records() {
        let reg = registry(ScriptedSource::new(vec![Ok(vec![
            record("a", &[0.1; 3]),
            record("b", &[0.1, 0.2]),
        ])]));
        assert!(matches!(reg.load(), LoadOutcome::Primary(1)));
    }

    #[test]
    fn test_failed_refresh_retains_previous_snapshot() {
        let reg = registry(ScriptedSource::new(vec![
            Ok(vec![record("a", &[0.1, 0.2])]),
            Err("connection refused".into()),
        ]));
        reg.load();
        let before = reg.current();

        assert!(matches!(reg.load(), LoadOutcome::Retained(_)));
        let after = reg.current();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_fallback_used_when_primary_never_loaded() {
        let reg = registry(ScriptedSource::new(vec![Err("down".into())])).with_fallback(Arc::new(
            ScriptedSource::degraded(vec![Ok(vec![record("local:ada", &[1.0, 0.0])])]),
        ));
        assert!(matches!(reg.load(), LoadOutcome::Degraded(1)));
        assert_eq!(reg.current().origin(), SnapshotOrigin::Degraded);
    }

    #[test]
    fn test_fallback_not_used_over_primary_snapshot() {
        let reg = registry(ScriptedSource::new(vec![
            Ok(vec![record("a", &[0.1, 0.2])]),
            Err("down".into()),
        ]))
        .with_fallback(Arc::new(ScriptedSource::degraded(vec![Ok(vec![])])));
        reg.load();
        let before = reg.current();
        assert!(matches!(reg.load(), LoadOutcome::Retained(_)));
        assert!(Arc::ptr_eq(&before, &reg.current()));
        assert_eq!(reg.current().origin(), SnapshotOrigin::Primary);
    }

    #[test]
    fn test_primary_recovery_replaces_degraded_snapshot() {
        let reg = registry(ScriptedSource::new(vec![
            Err("down".into()),
            Ok(vec![record("a", &[0.1, 0.2])]),
        ]))
        .with_fallback(Arc::new(ScriptedSource::degraded(vec![Ok(vec![])])));
        assert!(matches!(reg.load(), LoadOutcome::Degraded(0)));
        assert!(matches!(reg.load(), LoadOutcome::Primary(1)));
        assert_eq!(reg.current().origin(), SnapshotOrigin::Primary);
    }

    #[test]
    fn test_needs_refresh_follows_interval_and_requests() {
        let reg = registry(ScriptedSource::new(vec![Ok(vec![])]));
        let start = Instant::now();
        assert!(reg.needs_refresh(start));

        reg.load();
        let now = Instant::now();
        assert!(!reg.needs_refresh(now));
        assert!(reg.needs_refresh(now + Duration::from_secs(31)));

        reg.request_refresh();
        assert!(reg.needs_refresh(now));
        reg.load();
        assert!(!reg.needs_refresh(Instant::now()));
    }

    #[test]
    fn test_reader_keeps_old_snapshot_across_refresh() {
        let reg = registry(ScriptedSource::new(vec![
            Ok(vec![record("a", &[0.1, 0.2])]),
            Ok(vec![record("b", &[0.3, 0.4]), record("c", &[0.5, 0.6])]),
        ]));
        reg.load();
        let held = reg.current();
        reg.load();
        assert_eq!(held.len(), 1);
        assert_eq!(held.records()[0].identity_id.as_str(), "a");
        assert_eq!(reg.current().len(), 2);
    }
}
