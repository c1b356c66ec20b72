//! Shared post-processing for the YOLO-family ONNX models.
//!
//! Letterbox preprocessing, output-tensor parsing and greedy NMS are the
//! same for the person detector and the face locator; only the score
//! column differs.

use crate::shared::frame::Frame;

/// Padding value used by YOLO letterboxing.
const LETTERBOX_GRAY: f32 = 114.0 / 255.0;

#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
}

impl RawDetection {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Letterbox geometry needed to map model coordinates back to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
pub fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i].corners(), &dets[j].corners()) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns the NCHW float32 tensor and the geometry used.
pub fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        LETTERBOX_GRAY,
    );

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// Parses a YOLO output tensor into frame-space detections.
///
/// Accepts both `[1, features, detections]` (transposed, as exported by
/// Ultralytics) and `[1, detections, features]`. Each row starts with
/// `cx, cy, w, h`; `score_index` selects the column holding the score of
/// interest.
pub fn parse_yolo_output(
    data: &[f32],
    shape: &[usize],
    score_index: usize,
    confidence: f64,
    geometry: &Letterbox,
) -> Result<Vec<RawDetection>, String> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}"));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= score_index {
        return Err(format!(
            "YOLO output has {num_feats} features, score column {score_index} out of range"
        ));
    }
    if data.len() < num_dets * num_feats {
        return Err("YOLO output shorter than its shape".into());
    }

    let feature = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let pad_x = geometry.pad_x as f64;
    let pad_y = geometry.pad_y as f64;
    let scale = geometry.scale;

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = feature(i, score_index);
        if conf < confidence {
            continue;
        }
        let cx = feature(i, 0);
        let cy = feature(i, 1);
        let w = feature(i, 2);
        let h = feature(i, 3);
        dets.push(RawDetection {
            x1: ((cx - w / 2.0) - pad_x) / scale,
            y1: ((cy - h / 2.0) - pad_y) / scale,
            x2: ((cx + w / 2.0) - pad_x) / scale,
            y2: ((cy + h / 2.0) - pad_y) / scale,
            confidence: conf,
        });
    }
    Ok(dets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn test_bbox_iou_no_overlap() {
        assert_eq!(
            bbox_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_bbox_iou_partial_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 5.0, 15.0, 15.0];
        assert_relative_eq!(bbox_iou(&a, &b), 25.0 / 175.0);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.8),
            det(5.0, 5.0, 105.0, 105.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.45);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(&mut dets, 0.45).len(), 2);
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, geometry) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(geometry.scale, 3.2, epsilon = 1e-9);
        assert_eq!(geometry.pad_x, 0);
        assert_eq!(geometry.pad_y, 160);
        assert!((tensor[[0, 0, 0, 0]] - LETTERBOX_GRAY).abs() < 1e-6);
        assert!((tensor[[0, 0, 161, 1]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_transposed_output_maps_back_to_frame() {
        // 5 features (cx, cy, w, h, score) x 6 detections, feature-major
        let shape = [1, 5, 6];
        #[rustfmt::skip]
        let data = vec![
            100.0, 300.0, 0.0, 0.0, 0.0, 0.0, // cx
            100.0, 300.0, 0.0, 0.0, 0.0, 0.0, // cy
            40.0,  40.0,  0.0, 0.0, 0.0, 0.0, // w
            80.0,  80.0,  0.0, 0.0, 0.0, 0.0, // h
            0.9,   0.1,   0.0, 0.0, 0.0, 0.0, // score
        ];
        let geometry = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 20,
        };
        let dets = parse_yolo_output(&data, &shape, 4, 0.5, &geometry).unwrap();

        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 40.0);
        assert_relative_eq!(dets[0].y1, 20.0);
        assert_relative_eq!(dets[0].x2, 60.0);
        assert_relative_eq!(dets[0].y2, 60.0);
        assert_relative_eq!(dets[0].confidence, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_row_major_output() {
        // 6 detections x 5 features, detection-major
        let shape = [1, 6, 5];
        let mut data = vec![0.0f32; 30];
        data[..5].copy_from_slice(&[50.0, 50.0, 20.0, 20.0, 0.7]);
        let geometry = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let dets = parse_yolo_output(&data, &shape, 4, 0.5, &geometry).unwrap();
        assert_eq!(dets.len(), 1);
        assert_relative_eq!(dets[0].x1, 40.0);
        assert_relative_eq!(dets[0].y2, 60.0);
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        let geometry = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        assert!(parse_yolo_output(&[0.0; 4], &[1, 4], 4, 0.5, &geometry).is_err());
        assert!(parse_yolo_output(&[0.0; 8], &[1, 2, 4], 4, 0.5, &geometry).is_err());
    }
}
