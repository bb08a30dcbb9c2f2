/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS post-processing.
/// Output boxes are in original frame coordinates and carry no identity;
/// association across frames happens in the face tracker.
use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.25;

/// Faces smaller than this on either side are ignored.
pub const DEFAULT_MIN_FACE_PX: i32 = 30;

const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    min_face_px: i32,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (NCHW),
    /// falling back to 640 when the shape is dynamic.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = load_session(model_path, threads)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            min_face_px: DEFAULT_MIN_FACE_PX,
            input_size,
        })
    }

    pub fn with_min_face_px(mut self, min_face_px: i32) -> Self {
        self.min_face_px = min_face_px;
        self
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.channels() != 3 {
            return Err(format!("Expected RGB frame, got {} channels", frame.channels()).into());
        }
        let (input, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let candidates = parse_output(data, &shape, self.confidence, &letterbox)?;
        let min = self.min_face_px;
        Ok(nms(candidates, NMS_IOU_THRESH)
            .into_iter()
            .map(|c| c.bbox)
            .filter(|b| b.width >= min && b.height >= min)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` x `target_size`, normalized to
/// `[0, 1]` in NCHW layout with YOLO's 114 gray padding.
fn letterbox(frame: &Frame, target_size: u32) -> (Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded canvas
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[src_y, src_x, c]] as f32 / 255.0;
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

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    bbox: BoundingBox,
    confidence: f64,
}

/// Decodes `[cx, cy, w, h, conf, ...]` rows from a `[1, F, N]` or `[1, N, F]`
/// output tensor, keeping rows at or above `confidence`.
fn parse_output(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    // Features are the short axis; YOLOv8+ exports them first.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Ok(Vec::new());
    }

    let value = |det: usize, feat: usize| -> f64 {
        let idx = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[idx] as f64
    };

    let mut candidates = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, 4);
        if conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
        candidates.push(Candidate {
            bbox: BoundingBox::from_corners(x1, y1, x2, y2),
            confidence: conf,
        });
    }
    Ok(candidates)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if keep.iter().all(|k| k.bbox.iou(&c.bbox) <= iou_thresh) {
            keep.push(c);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const IDENTITY: Letterbox = Letterbox {
        scale: 1.0,
        pad_x: 0,
        pad_y: 0,
    };

    fn candidate(x: i32, y: i32, size: i32, confidence: f64) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(x, y, size, size),
            confidence,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, new 640x320, pad_y 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 0.01);
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        let inside = tensor[[0, 0, lb.pad_y as usize + 1, 1]];
        assert_relative_eq!(inside, 1.0, epsilon = 0.01);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 114.0 / 255.0, epsilon = 0.01);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 40,
        };
        assert_eq!(lb.unmap(100.0, 140.0), (50.0, 50.0));
    }

    #[test]
    fn test_parse_output_row_major() {
        // [1, N=2, F=5]
        let data = [
            50.0, 50.0, 20.0, 20.0, 0.9, //
            10.0, 10.0, 4.0, 4.0, 0.1,
        ];
        let parsed = parse_output(&data, &[1, 2, 5], 0.5, &IDENTITY).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].bbox, BoundingBox::new(40, 40, 20, 20));
    }

    #[test]
    fn test_parse_output_transposed() {
        // [1, F=5, N=6]: only detection 3 is confident
        let mut data = vec![0.0f32; 5 * 6];
        let det = 3;
        data[det] = 100.0; // cx
        data[6 + det] = 60.0; // cy
        data[12 + det] = 40.0; // w
        data[18 + det] = 30.0; // h
        data[24 + det] = 0.8; // conf
        let parsed = parse_output(&data, &[1, 5, 6], 0.5, &IDENTITY).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].bbox, BoundingBox::new(80, 45, 40, 30));
    }

    #[test]
    fn test_parse_output_rejects_bad_rank() {
        assert!(parse_output(&[0.0; 4], &[4], 0.5, &IDENTITY).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let kept = nms(
            vec![candidate(0, 0, 100, 0.8), candidate(5, 5, 100, 0.9)],
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let kept = nms(
            vec![candidate(0, 0, 50, 0.9), candidate(200, 200, 50, 0.8)],
            0.3,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(Vec::new(), 0.3).is_empty());
    }
}
