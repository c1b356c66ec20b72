use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fleet::domain::camera::CameraId;
use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::identity::IdentityId;
use crate::shared::bounding_box::BoundingBox;

/// An accepted sighting of a sought identity on one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub camera_location: String,
    pub identity_id: IdentityId,
    pub display_name: String,
    pub similarity: f64,
    pub distance: f64,
    pub detection_confidence: f64,
    pub bounding_box: BoundingBox,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Embedding>,
}

/// Rate-limiting key: one cooldown window per camera and identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CooldownKey {
    pub camera_id: CameraId,
    pub identity_id: IdentityId,
}

impl CooldownKey {
    pub fn new(camera_id: CameraId, identity_id: IdentityId) -> Self {
        Self {
            camera_id,
            identity_id,
        }
    }
}

impl AlertEvent {
    pub fn cooldown_key(&self) -> CooldownKey {
        CooldownKey::new(self.camera_id.clone(), self.identity_id.clone())
    }
}
