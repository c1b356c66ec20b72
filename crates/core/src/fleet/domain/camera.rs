use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A camera as listed by the fleet roster. Identity is `camera_id` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    #[serde(rename = "cameraId")]
    pub camera_id: CameraId,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "streamUrl", default)]
    pub stream_address: String,
    #[serde(rename = "isActive", default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CameraDescriptor {
    pub fn new(
        camera_id: impl Into<String>,
        display_name: impl Into<String>,
        location: impl Into<String>,
        stream_address: impl Into<String>,
    ) -> Self {
        Self {
            camera_id: CameraId::new(camera_id),
            display_name: display_name.into(),
            location: location.into(),
            stream_address: stream_address.into(),
            active: true,
        }
    }

    /// Webcam attached to the host running the service rather than a
    /// network stream.
    pub fn is_local_device(&self) -> bool {
        self.stream_address.trim() == "0" || self.camera_id.as_str().contains("cam_local")
    }

    /// Name for logs: display name when set, else the id.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            self.camera_id.as_str()
        } else {
            &self.display_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_deserializes_backend_shape() {
        let cam: CameraDescriptor = serde_json::from_str(
            r#"{"cameraId":"cam1","name":"Gate","location":"North","streamUrl":"rtsp://x/1"}"#,
        )
        .unwrap();
        assert_eq!(cam.camera_id.as_str(), "cam1");
        assert_eq!(cam.display_name, "Gate");
        assert_eq!(cam.stream_address, "rtsp://x/1");
        assert!(cam.active);
    }

    #[rstest]
    #[case("cam1", "0", true)]
    #[case("cam_local_desk", "rtsp://x", true)]
    #[case("cam1", "rtsp://x", false)]
    #[case("cam1", "10", false)]
    fn test_is_local_device(#[case] id: &str, #[case] address: &str, #[case] expected: bool) {
        let cam = CameraDescriptor::new(id, "", "", address);
        assert_eq!(cam.is_local_device(), expected);
    }

    #[test]
    fn test_label_falls_back_to_id() {
        assert_eq!(CameraDescriptor::new("cam9", "", "", "0").label(), "cam9");
        assert_eq!(CameraDescriptor::new("cam9", "Lobby", "", "0").label(), "Lobby");
    }
}
