use std::sync::Arc;

use crate::detection::domain::face_locator::FaceLocator;
use crate::recognition::domain::embedding::{DistanceMetric, Embedding};
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::match_result::MatchResult;
use crate::recognition::domain::registry_snapshot::RegistrySnapshot;
use crate::recognition::face_registry::FaceRegistry;
use crate::shared::config::ConfigError;
use crate::shared::frame::Frame;

/// Turns a person crop into a [`MatchResult`] against the current registry.
pub struct IdentityMatcher {
    locator: Arc<dyn FaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
    registry: Arc<FaceRegistry>,
    threshold: f64,
    metric: DistanceMetric,
}

impl IdentityMatcher {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        embedder: Arc<dyn FaceEmbedder>,
        registry: Arc<FaceRegistry>,
        threshold: f64,
        metric: DistanceMetric,
    ) -> Result<Self, ConfigError> {
        if embedder.dimension() != registry.dimension() {
            return Err(ConfigError::Invalid(format!(
                "embedder produces {}-d embeddings but the registry expects {}-d",
                embedder.dimension(),
                registry.dimension()
            )));
        }
        Ok(Self {
            locator,
            embedder,
            registry,
            threshold,
            metric,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Locates a face in `person_crop`, embeds it and compares it against
    /// one registry snapshot.
    ///
    /// `Ok(None)` when the registry is empty or no face is visible.
    pub fn match_person(
        &self,
        person_crop: &Frame,
    ) -> Result<Option<MatchResult>, Box<dyn std::error::Error>> {
        let snapshot = self.registry.current();
        if snapshot.is_empty() {
            return Ok(None);
        }
        let Some(face_box) = self.locator.locate(person_crop)? else {
            return Ok(None);
        };
        let face = person_crop.crop(&face_box);
        if face.width() == 0 || face.height() == 0 {
            return Ok(None);
        }
        let query = self.embedder.embed(&face)?;
        Ok(self.match_embedding(&snapshot, query))
    }

    /// Nearest-neighbour decision for an already extracted embedding.
    /// Accepts iff the nearest distance is `<= threshold`.
    pub fn match_embedding(&self, snapshot: &RegistrySnapshot, query: Embedding) -> Option<MatchResult> {
        let (record, distance) = snapshot.nearest(&query, self.metric)?;
        if distance <= self.threshold {
            Some(MatchResult::matched(
                record.identity_id.clone(),
                record.display_name.clone(),
                distance,
                query,
            ))
        } else {
            Some(MatchResult::no_match(distance, query))
        }
    }
}
