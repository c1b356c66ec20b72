pub mod math;
pub mod onnx_face_locator;
pub mod onnx_person_detector;
pub mod onnx_session;
