//! BlazeFace face detector using ONNX Runtime via `ort`.
//!
//! Produces one [`Detection`] per face with a bounding box and the
//! landmark set decoded from the model's six keypoints.

use std::path::Path;

use ort::execution_providers::ExecutionProviderDispatch;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{FaceDetector, InferenceError, ModelLoadError};
use crate::detection::domain::face_landmarks::LandmarkSet;
use crate::shared::frame::Frame;
use crate::shared::geometry::{BoundingBox, Point};

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.75;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: 4 box terms + 6 keypoints.
const REGRESSOR_STRIDE: usize = 16;
const NUM_KEYPOINTS: usize = 6;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f32,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model.
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, ModelLoadError> {
        if !model_path.exists() {
            return Err(ModelLoadError::NotFound(model_path.to_path_buf()));
        }
        let load_err = |e: &dyn std::fmt::Display| ModelLoadError::Session {
            path: model_path.to_path_buf(),
            reason: e.to_string(),
        };

        let (provider, providers) = execution_providers();
        let session = ort::session::Session::builder()
            .map_err(|e| load_err(&e))?
            .with_execution_providers(providers)
            .map_err(|e| load_err(&e))?
            .commit_from_file(model_path)
            .map_err(|e| load_err(&e))?;

        log::info!(
            "BlazeFace model loaded from {} ({provider}, confidence {confidence})",
            model_path.display()
        );

        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        let fw = frame.width();
        let fh = frame.height();
        if fw == 0 || fh == 0 {
            return Ok(Vec::new());
        }

        // 1. Preprocess: resize to 128x128, normalize to [0,1], NCHW
        let input_tensor = preprocess(frame, INPUT_SIZE);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1] (confidence logits)
        if outputs.len() < 2 {
            return Err(InferenceError::Failed(format!(
                "BlazeFace model expected 2 outputs, got {}",
                outputs.len()
            )));
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors
            .as_slice()
            .ok_or_else(|| InferenceError::Failed("cannot get regressor slice".into()))?;
        let score_data = scores
            .as_slice()
            .ok_or_else(|| InferenceError::Failed("cannot get score slice".into()))?;

        // 3. Decode anchors above the confidence threshold
        let raw = decode(reg_data, score_data, &self.anchors, self.confidence, fw, fh)?;

        // 4. NMS
        Ok(nms(raw, NMS_IOU_THRESH))
    }
}

/// Accelerator to request for this platform. ONNX Runtime quietly falls
/// back to its CPU provider when the accelerator cannot be registered.
fn execution_providers() -> (&'static str, Vec<ExecutionProviderDispatch>) {
    #[cfg(target_os = "macos")]
    {
        (
            "CoreML",
            vec![ort::execution_providers::CoreMLExecutionProvider::default().build()],
        )
    }
    #[cfg(target_os = "windows")]
    {
        (
            "DirectML",
            vec![ort::execution_providers::DirectMLExecutionProvider::default().build()],
        )
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("CPU", Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
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
// Decoding
// ---------------------------------------------------------------------------

/// Turns raw model outputs into frame-space detections.
///
/// Box centres and keypoints are offsets from the anchor in input pixels.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    fw: u32,
    fh: u32,
) -> Result<Vec<Detection>, InferenceError> {
    let scale = INPUT_SIZE as f32;
    let num_anchors = anchors.len().min(NUM_ANCHORS);
    let mut dets = Vec::new();

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < confidence {
            continue;
        }

        let anchor = &anchors[i];
        let offset = i * REGRESSOR_STRIDE;
        if offset + 4 > reg_data.len() {
            break;
        }

        let cx = anchor[0] + reg_data[offset] / scale;
        let cy = anchor[1] + reg_data[offset + 1] / scale;
        let w = reg_data[offset + 2] / scale;
        let h = reg_data[offset + 3] / scale;

        let bounding_box = BoundingBox::new(
            Point::new((cx - w / 2.0) * fw as f32, (cy - h / 2.0) * fh as f32),
            Point::new((cx + w / 2.0) * fw as f32, (cy + h / 2.0) * fh as f32),
        )
        .clamp_to(fw, fh);

        let landmarks = if offset + REGRESSOR_STRIDE <= reg_data.len() {
            let keypoints: Vec<Point> = (0..NUM_KEYPOINTS)
                .map(|k| {
                    let kx = anchor[0] + reg_data[offset + 4 + 2 * k] / scale;
                    let ky = anchor[1] + reg_data[offset + 5 + 2 * k] / scale;
                    Point::new(kx * fw as f32, ky * fh as f32)
                })
                .collect();
            Some(LandmarkSet::from_points(&keypoints)?)
        } else {
            None
        };

        dets.push(Detection::new(bounding_box, landmarks, score));
    }

    Ok(dets)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

fn nms(mut dets: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.bounding_box.iou(&det.bounding_box) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
        Detection::new(
            BoundingBox::new(Point::new(x1, y1), Point::new(x2, y2)),
            None,
            confidence,
        )
    }

    #[test]
    fn test_preprocess_shape() {
        let data = vec![128u8; 200 * 100 * 3];
        let frame = Frame::new(data, 200, 100, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
    }

    #[test]
    fn test_preprocess_normalized() {
        let data = vec![255u8; 50 * 50 * 3];
        let frame = Frame::new(data, 50, 50, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_generate_anchors_count() {
        // 16×16 grid × 2 anchors + 8×8 grid × 6 anchors = 512 + 384 = 896
        assert_eq!(generate_anchors().len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        for a in &generate_anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_decode_skips_low_scores() {
        let anchors = vec![[0.5, 0.5]];
        let reg = vec![0.0f32; REGRESSOR_STRIDE];
        let dets = decode(&reg, &[-10.0], &anchors, 0.5, 640, 480).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn test_decode_box_and_landmarks_in_frame_space() {
        // Anchor at frame centre, box 64x64 input px (half the input), no offset.
        let anchors = vec![[0.5, 0.5]];
        let mut reg = vec![0.0f32; REGRESSOR_STRIDE];
        reg[2] = 64.0;
        reg[3] = 64.0;
        // keypoint 0 (left eye) 16 input px left and up of the anchor
        reg[4] = -16.0;
        reg[5] = -16.0;
        // keypoint 3 (mouth) 16 input px below the anchor
        reg[11] = 16.0;

        let dets = decode(&reg, &[10.0], &anchors, 0.5, 640, 480).unwrap();
        assert_eq!(dets.len(), 1);

        let b = dets[0].bounding_box;
        assert_relative_eq!(b.top_left.x, 160.0);
        assert_relative_eq!(b.top_left.y, 120.0);
        assert_relative_eq!(b.bottom_right.x, 480.0);
        assert_relative_eq!(b.bottom_right.y, 360.0);

        let lm = dets[0].landmarks.expect("landmarks decoded");
        assert_relative_eq!(lm.left_eye.x, 240.0);
        assert_relative_eq!(lm.left_eye.y, 180.0);
        assert_relative_eq!(lm.nose.x, 320.0);
        assert_relative_eq!(lm.mouth.y, 300.0);
    }

    #[test]
    fn test_decode_without_keypoint_data_has_no_landmarks() {
        let anchors = vec![[0.5, 0.5]];
        let reg = vec![0.0f32, 0.0, 32.0, 32.0];
        let dets = decode(&reg, &[10.0], &anchors, 0.5, 128, 128).unwrap();
        assert_eq!(dets.len(), 1);
        assert!(dets[0].landmarks.is_none());
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let dets = vec![
            det(5.0, 5.0, 105.0, 105.0, 0.7),
            det(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let kept = nms(dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_separate_faces() {
        let dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(dets, 0.3).len(), 2);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let err = OnnxBlazefaceDetector::new(Path::new("/nonexistent/blazeface.onnx"), 0.5)
            .err()
            .expect("load must fail");
        assert!(matches!(err, ModelLoadError::NotFound(_)));
    }
}
