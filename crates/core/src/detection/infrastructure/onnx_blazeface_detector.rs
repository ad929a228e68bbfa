/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// Short-range model, boxes only. Accepts grayscale or RGB frames; a
/// grayscale frame is fed to the network as three identical planes.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Regressor values per anchor: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be within 0.0..=1.0, got {confidence}").into());
        }
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        log::info!("Loaded BlazeFace model from {}", model_path.display());
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;

        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = Vec::new();
        for (i, &raw_score) in score_data.iter().enumerate().take(self.anchors.len()) {
            let score = sigmoid(raw_score);
            if (score as f64) < self.confidence {
                continue;
            }

            let offset = i * REGRESSOR_STRIDE;
            if offset + 4 > reg_data.len() {
                break;
            }

            let anchor = self.anchors[i];
            let cx = anchor[0] + reg_data[offset] / INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[offset + 1] / INPUT_SIZE as f32;
            let w = reg_data[offset + 2] / INPUT_SIZE as f32;
            let h = reg_data[offset + 3] / INPUT_SIZE as f32;

            raw_dets.push(RawDet {
                x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
                y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
                x2: ((cx + w / 2.0) * fw).min(fw) as f64,
                y2: ((cy + h / 2.0) * fh).min(fh) as f64,
                score: score as f64,
            });
        }

        let boxes = nms(&mut raw_dets, NMS_IOU_THRESH)
            .iter()
            .filter_map(|d| to_bounding_box(d, frame.width(), frame.height()))
            .collect();

        Ok(boxes)
    }
}

/// Integer box clamped to the frame; degenerate boxes are dropped.
fn to_bounding_box(det: &RawDet, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
    let x = det.x1 as i32;
    let y = det.y1 as i32;
    let w = ((det.x2 - det.x1) as i32).min(frame_w as i32 - x);
    let h = ((det.y2 - det.y1) as i32).min(frame_h as i32 - y);
    (w > 0 && h > 0).then(|| BoundingBox::new(x, y, w, h))
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Nearest-neighbour resize to `size × size`, normalized to [0,1] NCHW.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let last_channel = frame.channels() as usize - 1;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c.min(last_channel)]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// 16×16 grid with 2 anchors per cell, then 8×8 with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

/// Greedy NMS; survivors come out highest score first.
fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDet> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| bbox_iou(k, det) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
