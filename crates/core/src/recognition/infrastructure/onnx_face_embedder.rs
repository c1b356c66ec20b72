/// ArcFace embedding extractor using ONNX Runtime.
///
/// Produces L2-normalized embeddings from face crops of any size; the crop is
/// resampled to the model's 112x112 input.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::onnx_session::build_session;
use crate::recognition::domain::embedding::{l2_normalize, Embedding};
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceEmbedder {
    session: Mutex<ort::session::Session>,
    dimension: usize,
}

impl OnnxFaceEmbedder {
    /// Loads the model. `dimension` is the embedding width the model is
    /// expected to emit; outputs of any other width are rejected.
    pub fn new(model_path: &Path, dimension: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
            dimension,
        })
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, face: &Frame) -> Result<Embedding, Box<dyn std::error::Error>> {
        if face.width() == 0 || face.height() == 0 {
            return Err("Cannot embed an empty face crop".into());
        }
        let tensor = preprocess(face.data(), face.width(), face.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;

        let mut values = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| format!("Lock poisoned: {e}"))?;
            let outputs = session.run(ort::inputs![input_value])?;
            let embedding_array = outputs[0].try_extract_array::<f32>()?;
            embedding_array
                .as_slice()
                .ok_or("Cannot get embedding slice")?
                .to_vec()
        };

        if values.len() != self.dimension {
            return Err(format!(
                "Embedding model produced {} values, expected {}",
                values.len(),
                self.dimension
            )
            .into());
        }
        l2_normalize(&mut values);
        Ok(Embedding::new(values))
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}
