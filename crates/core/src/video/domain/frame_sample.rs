use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::fleet::domain::camera::CameraId;
use crate::shared::frame::Frame;

/// One captured frame tagged with its camera and capture time.
///
/// `captured_at` drives cooldown arithmetic; `wall_time` is what alerts
/// report.
#[derive(Clone, Debug)]
pub struct FrameSample {
    pub frame: Frame,
    pub camera_id: CameraId,
    pub captured_at: Instant,
    pub wall_time: DateTime<Utc>,
}

impl FrameSample {
    pub fn capture(frame: Frame, camera_id: CameraId) -> Self {
        Self {
            frame,
            camera_id,
            captured_at: Instant::now(),
            wall_time: Utc::now(),
        }
    }
}
