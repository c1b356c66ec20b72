use crate::detection::domain::detection_candidate::DetectionCandidate;
use crate::shared::frame::Frame;

/// Domain interface for person detection.
///
/// One detector is shared across camera workers, so implementations
/// synchronize internally and take `&self`.
pub trait PersonDetector: Send + Sync {
    /// Returns persons at or above the confidence floor whose boxes clear
    /// the minimum crop size, in descending confidence order.
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionCandidate>, Box<dyn std::error::Error>>;
}
