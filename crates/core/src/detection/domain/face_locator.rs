use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Finds the most prominent face inside a person crop.
///
/// `Ok(None)` is the normal result when no face is visible (back of the
/// head, heavy occlusion).
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &Frame) -> Result<Option<BoundingBox>, Box<dyn std::error::Error>>;
}
