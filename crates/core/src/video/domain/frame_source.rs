use thiserror::Error;

use crate::fleet::domain::camera::CameraDescriptor;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open {address}: {reason}")]
    Open { address: String, reason: String },
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("no frame within {0:?}")]
    Timeout(std::time::Duration),
    #[error("stream ended")]
    EndOfStream,
    #[error("source is not open")]
    Closed,
}

/// A camera capture handle.
///
/// `read` may fail transiently; callers decide whether to retry.
/// `release` must be safe to call more than once.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Blocks until the next frame is decoded.
    fn read(&mut self) -> Result<Frame, CaptureError>;

    fn release(&mut self);
}

/// Builds an unopened [`FrameSource`] for a camera.
pub trait FrameSourceFactory: Send + Sync {
    fn create(&self, camera: &CameraDescriptor) -> Box<dyn FrameSource>;
}
