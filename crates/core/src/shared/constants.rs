use crate::shared::model_resolver::ModelSpec;

/// COCO-trained YOLOv8 person detector. Not published by us, so it must be
/// supplied through the models directory.
pub const PERSON_MODEL: ModelSpec = ModelSpec {
    file_name: "yolov8n.onnx",
    url: None,
};

pub const FACE_MODEL: ModelSpec = ModelSpec {
    file_name: "yolo11n-pose_widerface.onnx",
    url: Some(
        "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx",
    ),
};

pub const EMBEDDING_MODEL: ModelSpec = ModelSpec {
    file_name: "w600k_r50.onnx",
    url: Some("https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx"),
};

/// Output width of the ArcFace embedding model.
pub const ARCFACE_DIMENSION: usize = 512;

/// Encoding width the backend recognition endpoint accepts.
pub const BACKEND_ENCODING_DIMENSION: usize = 128;

/// COCO class index for "person".
pub const PERSON_CLASS_ID: usize = 0;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
