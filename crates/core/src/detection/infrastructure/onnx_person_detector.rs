/// COCO YOLOv8 person detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, person-class filtering, NMS,
/// and cropping through the domain's `DetectionCandidate`.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::detection_candidate::{CropPolicy, DetectionCandidate};
use crate::detection::domain::person_detector::PersonDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::PERSON_CLASS_ID;
use crate::shared::frame::Frame;

use super::math::{letterbox, nms, parse_yolo_output};
use super::onnx_session::{build_session, input_size};

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Column of the person class score: 4 box values precede the class scores.
const PERSON_SCORE_INDEX: usize = 4 + PERSON_CLASS_ID;

pub struct OnnxPersonDetector {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    crop_policy: CropPolicy,
    input_size: u32,
}

impl OnnxPersonDetector {
    pub fn new(
        model_path: &Path,
        confidence: f64,
        crop_policy: CropPolicy,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        let input_size = input_size(&session, DEFAULT_INPUT_SIZE);
        log::info!(
            "Person detector loaded from {} ({input_size}px input)",
            model_path.display()
        );
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            crop_policy,
            input_size,
        })
    }
}

impl PersonDetector for OnnxPersonDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionCandidate>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, geometry) = letterbox(frame, self.input_size);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;

        let mut raw_dets = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("Person model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let shape = tensor.shape().to_vec();
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            parse_yolo_output(data, &shape, PERSON_SCORE_INDEX, self.confidence, &geometry)?
        };

        let kept = nms(&mut raw_dets, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .filter_map(|d| {
                let bbox = BoundingBox::from_corners(d.x1, d.y1, d.x2, d.y2);
                DetectionCandidate::from_frame(frame, bbox, d.confidence, &self.crop_policy)
            })
            .collect())
    }
}
