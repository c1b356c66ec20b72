use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recognition::domain::embedding::DistanceMetric;
use crate::shared::constants::ARCFACE_DIMENSION;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.5;
/// Cosine distance 0.6, i.e. ArcFace cosine similarity of at least 0.4.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;
pub const DEFAULT_SAMPLING_STRIDE: u64 = 3;
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_FLEET_REFRESH_SECS: u64 = 10;
pub const DEFAULT_REGISTRY_REFRESH_SECS: u64 = 30;
pub const DEFAULT_MIN_CROP_SIZE: u32 = 50;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every tunable of the surveillance service, built once at startup and
/// handed to each component's constructor.
///
/// Missing JSON fields fall back to the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveillanceConfig {
    pub backend_url: String,
    pub http_timeout_ms: u64,
    /// Minimum person-detection confidence (0.0-1.0).
    pub detection_confidence: f64,
    /// Maximum embedding distance accepted as a match (inclusive).
    pub match_threshold: f64,
    pub embedding_dimension: usize,
    pub distance_metric: DistanceMetric,
    /// Run detection on every Nth frame.
    pub sampling_stride: u64,
    pub alert_cooldown_secs: u64,
    pub fleet_refresh_secs: u64,
    pub registry_refresh_secs: u64,
    pub min_crop_width: u32,
    pub min_crop_height: u32,
    pub frame_timeout_ms: u64,
    pub recovery_backoff_ms: u64,
    pub max_consecutive_failures: u32,
    pub stop_timeout_ms: u64,
    pub local_registry_dir: Option<PathBuf>,
    pub skip_local_devices: bool,
    /// Registry status filter, e.g. "missing".
    pub identity_status: String,
    pub identity_limit: usize,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            http_timeout_ms: 10_000,
            detection_confidence: DEFAULT_DETECTION_CONFIDENCE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            embedding_dimension: ARCFACE_DIMENSION,
            distance_metric: DistanceMetric::Cosine,
            sampling_stride: DEFAULT_SAMPLING_STRIDE,
            alert_cooldown_secs: DEFAULT_ALERT_COOLDOWN_SECS,
            fleet_refresh_secs: DEFAULT_FLEET_REFRESH_SECS,
            registry_refresh_secs: DEFAULT_REGISTRY_REFRESH_SECS,
            min_crop_width: DEFAULT_MIN_CROP_SIZE,
            min_crop_height: DEFAULT_MIN_CROP_SIZE,
            frame_timeout_ms: 5_000,
            recovery_backoff_ms: 1_000,
            max_consecutive_failures: 5,
            stop_timeout_ms: 5_000,
            local_registry_dir: None,
            skip_local_devices: false,
            identity_status: "missing".to_string(),
            identity_limit: 1000,
        }
    }
}

impl SurveillanceConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(ConfigError::Invalid(format!(
                "detection_confidence must be between 0.0 and 1.0, got {}",
                self.detection_confidence
            )));
        }
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a non-negative distance, got {}",
                self.match_threshold
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedding_dimension must be positive".into(),
            ));
        }
        if self.sampling_stride == 0 {
            return Err(ConfigError::Invalid("sampling_stride must be >= 1".into()));
        }
        if self.fleet_refresh_secs == 0 || self.registry_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh intervals must be at least one second".into(),
            ));
        }
        if self.frame_timeout_ms == 0 || self.http_timeout_ms == 0 || self.stop_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_failures must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Settings that are valid but unlikely to behave as intended.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.distance_metric == DistanceMetric::Euclidean
            && self.embedding_dimension == ARCFACE_DIMENSION
        {
            // Unit vectors: |a - b|^2 = 2 - 2cos.
            let min_cosine = 1.0 - self.match_threshold * self.match_threshold / 2.0;
            warnings.push(format!(
                "euclidean match_threshold {} on normalized {}-d embeddings requires cosine similarity >= {:.3}; \
                 consider \"distance_metric\": \"cosine\"",
                self.match_threshold, ARCFACE_DIMENSION, min_cosine
            ));
        }
        warnings
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn fleet_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.fleet_refresh_secs)
    }

    pub fn registry_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.registry_refresh_secs)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
