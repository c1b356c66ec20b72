use chrono::{DateTime, Utc};

use crate::fleet::domain::camera::{CameraDescriptor, CameraId};
use crate::shared::source_error::SourceError;

/// Status reported back to the fleet roster for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Active,
    Inactive,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Active => "active",
            CameraStatus::Inactive => "inactive",
        }
    }
}

/// Supplies the camera roster.
pub trait FleetSource: Send + Sync {
    /// Active cameras only.
    fn fetch_roster(&self) -> Result<Vec<CameraDescriptor>, SourceError>;

    fn report_status(
        &self,
        _camera_id: &CameraId,
        _status: CameraStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), SourceError> {
        Ok(())
    }
}
