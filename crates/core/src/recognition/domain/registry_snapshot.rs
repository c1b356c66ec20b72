use std::time::Instant;

use crate::recognition::domain::embedding::{DistanceMetric, Embedding};
use crate::recognition::domain::identity::IdentityRecord;

/// Where a snapshot's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// No load has succeeded yet.
    Empty,
    Primary,
    /// Built by the local-directory fallback while the primary was down.
    Degraded,
}

/// Immutable, ordered set of identity records valid at one point in time.
///
/// Matchers hold an `Arc` to a snapshot for the whole comparison, so a
/// concurrent refresh can never expose a half-built record list.
#[derive(Debug)]
pub struct RegistrySnapshot {
    records: Vec<IdentityRecord>,
    dimension: usize,
    origin: SnapshotOrigin,
    generation: u64,
    loaded_at: Instant,
}

impl RegistrySnapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            records: Vec::new(),
            dimension,
            origin: SnapshotOrigin::Empty,
            generation: 0,
            loaded_at: Instant::now(),
        }
    }

    /// Builds a snapshot; every record must already have `dimension` values.
    pub fn new(
        records: Vec<IdentityRecord>,
        dimension: usize,
        origin: SnapshotOrigin,
        generation: u64,
    ) -> Self {
        debug_assert!(
            records.iter().all(|r| r.embedding.dimension() == dimension),
            "snapshot records must share the snapshot dimension"
        );
        Self {
            records,
            dimension,
            origin,
            generation,
            loaded_at: Instant::now(),
        }
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// Number of distinct identities (records grouped by id).
    pub fn identity_count(&self) -> usize {
        let mut ids: Vec<_> = self.records.iter().map(|r| &r.identity_id).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }

    /// Nearest record to `query`. On exact ties the earliest record wins.
    pub fn nearest(
        &self,
        query: &Embedding,
        metric: DistanceMetric,
    ) -> Option<(&IdentityRecord, f64)> {
        let mut best: Option<(&IdentityRecord, f64)> = None;
        for record in &self.records {
            let d = record.embedding.distance(query, metric);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((record, d)),
            }
        }
        best
    }
}
