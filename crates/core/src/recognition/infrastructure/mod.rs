pub mod http_identity_source;
pub mod local_directory_source;
pub mod onnx_face_embedder;
