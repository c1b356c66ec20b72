/// YOLO face locator using the WIDER FACE pose model via `ort`.
///
/// Runs on a single person crop and keeps only the most confident face;
/// landmark columns in the output are ignored.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::math::{letterbox, parse_yolo_output};
use super::onnx_session::{build_session, input_size};

const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face presence inside a person crop.
pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;

/// Row layout: `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
const FACE_SCORE_INDEX: usize = 4;

/// Faces smaller than this (in crop pixels) are too blurry to embed.
const MIN_FACE_SIZE: i32 = 12;

pub struct OnnxFaceLocator {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceLocator {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let input_size = input_size(&session, DEFAULT_INPUT_SIZE);
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            input_size,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&self, image: &Frame) -> Result<Option<BoundingBox>, Box<dyn std::error::Error>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(None);
        }

        let (input_tensor, geometry) = letterbox(image, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let dets = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("Face model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let shape = tensor.shape().to_vec();
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            parse_yolo_output(data, &shape, FACE_SCORE_INDEX, self.confidence, &geometry)?
        };

        let best = dets
            .into_iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|d| {
                BoundingBox::from_corners(d.x1, d.y1, d.x2, d.y2)
                    .clamp_to(image.width(), image.height())
            })
            .filter(|b| b.width() >= MIN_FACE_SIZE && b.height() >= MIN_FACE_SIZE);

        Ok(best)
    }
}
