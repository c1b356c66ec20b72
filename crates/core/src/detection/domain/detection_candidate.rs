use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Minimum person-box size worth sending to face matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPolicy {
    pub min_width: u32,
    pub min_height: u32,
}

impl CropPolicy {
    pub fn new(min_width: u32, min_height: u32) -> Self {
        Self {
            min_width,
            min_height,
        }
    }

    pub fn accepts(&self, bbox: &BoundingBox) -> bool {
        bbox.width() >= self.min_width as i32 && bbox.height() >= self.min_height as i32
    }
}

/// A person detected in one frame, with its pixels already cropped out.
///
/// Lives for a single processing cycle.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub crop: Frame,
}

impl DetectionCandidate {
    /// Clamps `bbox` to the frame and crops it, or returns `None` when the
    /// clamped box falls below the policy's size floor.
    pub fn from_frame(
        frame: &Frame,
        bbox: BoundingBox,
        confidence: f64,
        policy: &CropPolicy,
    ) -> Option<Self> {
        let clamped = bbox.clamp_to(frame.width(), frame.height());
        if !policy.accepts(&clamped) {
            return None;
        }
        Some(Self {
            bbox: clamped,
            confidence,
            crop: frame.crop(&clamped),
        })
    }
}
