/// COCO object detector running a YOLO export through ONNX Runtime (`ort`).
///
/// Letterboxes the frame to the model's square input, runs inference,
/// decodes boxes and classes, applies per-class NMS and maps the survivors
/// back to frame pixels.
use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::detection_result::{BoundingBox, DetectionResult};
use crate::shared::frame::Frame;

use super::coco_labels::{label_for, COCO_LABELS};

/// Fallback input resolution when the model's input shape is dynamic.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Letterbox padding value (YOLO convention: 114 gray).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Row layout of the raw output tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputLayout {
    /// `[cx, cy, w, h, class scores...]` (YOLOv8 / YOLO11).
    Anchorless { num_classes: usize },
    /// `[cx, cy, w, h, objectness, class scores...]` (YOLOv5).
    WithObjectness { num_classes: usize },
}

impl OutputLayout {
    fn from_features(num_feats: usize, num_classes: usize) -> Option<Self> {
        if num_feats == 4 + num_classes {
            Some(Self::Anchorless { num_classes })
        } else if num_feats == 5 + num_classes {
            Some(Self::WithObjectness { num_classes })
        } else {
            None
        }
    }

    /// Best `(class_id, score)` for one decoded row.
    fn best_class(self, row: &[f32]) -> Option<(usize, f64)> {
        let (scores, objectness) = match self {
            Self::Anchorless { num_classes } => (&row[4..4 + num_classes], 1.0),
            Self::WithObjectness { num_classes } => (&row[5..5 + num_classes], row[4] as f64),
        };
        scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(id, &s)| (id, s as f64 * objectness))
    }
}

/// Where a frame landed inside the letterboxed model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(self, v: f64, pad: u32) -> f64 {
        (v - pad as f64) / self.scale
    }
}

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    input_size: u32,
    min_confidence: f64,
    nms_iou: f64,
}

impl OnnxYoloDetector {
    /// Wraps a committed session. The input size is read from the model's
    /// NCHW input shape, falling back to [`DEFAULT_INPUT_SIZE`].
    pub fn new(session: ort::session::Session, min_confidence: f64, nms_iou: f64) -> Self {
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

        log::info!("YOLO detector ready ({input_size}x{input_size} input)");

        Self {
            session,
            input_size,
            min_confidence,
            nms_iou,
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, DetectionError> {
        let (input_tensor, lb) = letterbox(frame, self.input_size)?;

        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectionError::UnexpectedOutput("model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::UnexpectedOutput(e.to_string()))?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::UnexpectedOutput("output is not contiguous".into()))?;

        let candidates = decode_output(data, &shape, lb, frame, self.min_confidence)?;
        Ok(nms(candidates, self.nms_iou))
    }
}

/// Letterbox-resizes `frame` into a `target` x `target` NCHW float tensor.
fn letterbox(
    frame: &Frame,
    target: u32,
) -> Result<(ndarray::Array4<f32>, Letterbox), DetectionError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DetectionError::Inference(format!(
            "cannot run detection on an empty {}x{} frame",
            frame.width(),
            frame.height()
        )));
    }
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let scale = (target as f64 / fw).min(target as f64 / fh);
    let new_w = ((fw * scale).round() as u32).min(target);
    let new_h = ((fh * scale).round() as u32).min(target);
    let pad_x = (target - new_w) / 2;
    let pad_y = (target - new_h) / 2;

    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target as usize, target as usize), PAD_VALUE);
    let src = frame.as_ndarray();
    let max_y = frame.height() as usize - 1;
    let max_x = frame.width() as usize - 1;

    // Nearest-neighbor sampling
    for y in 0..new_h as usize {
        let sy = ((y as f64 / scale) as usize).min(max_y);
        for x in 0..new_w as usize {
            let sx = ((x as f64 / scale) as usize).min(max_x);
            for c in 0..3 {
                tensor[[0, c, pad_y as usize + y, pad_x as usize + x]] =
                    src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    ))
}

#[derive(Clone, Debug)]
struct Candidate {
    class_id: usize,
    score: f64,
    corners: [f64; 4],
}

/// Turns the raw `[1, feats, dets]` or `[1, dets, feats]` tensor into
/// scored candidates in frame coordinates.
fn decode_output(
    data: &[f32],
    shape: &[usize],
    lb: Letterbox,
    frame: &Frame,
    min_confidence: f64,
) -> Result<Vec<Candidate>, DetectionError> {
    if shape.len() != 3 {
        return Err(DetectionError::UnexpectedOutput(format!(
            "expected a rank-3 output, got {shape:?}"
        )));
    }
    // Exports are usually transposed: fewer features than anchors.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    let layout = OutputLayout::from_features(num_feats, COCO_LABELS.len()).ok_or_else(|| {
        DetectionError::UnexpectedOutput(format!(
            "{num_feats} features per detection does not match {} classes",
            COCO_LABELS.len()
        ))
    })?;

    if data.len() < num_dets * num_feats {
        return Err(DetectionError::UnexpectedOutput(format!(
            "output holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )));
    }

    let mut row = vec![0f32; num_feats];
    let mut candidates = Vec::new();
    for i in 0..num_dets {
        for (f, slot) in row.iter_mut().enumerate() {
            *slot = if transposed {
                data[f * num_dets + i]
            } else {
                data[i * num_feats + f]
            };
        }
        let Some((class_id, score)) = layout.best_class(&row) else {
            continue;
        };
        if score < min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        let b = BoundingBox::from_corners_clamped(
            lb.to_frame(cx - w / 2.0, lb.pad_x),
            lb.to_frame(cy - h / 2.0, lb.pad_y),
            lb.to_frame(cx + w / 2.0, lb.pad_x),
            lb.to_frame(cy + h / 2.0, lb.pad_y),
            frame.width(),
            frame.height(),
        );
        candidates.push(Candidate {
            class_id,
            score,
            corners: [b.x, b.y, b.x + b.width, b.y + b.height],
        });
    }
    Ok(candidates)
}

/// Greedy per-class NMS, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64) -> Vec<DetectionResult> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == c.class_id && corner_iou(&k.corners, &c.corners) > iou_thresh);
        if !suppressed {
            kept.push(c);
        }
    }

    kept.into_iter()
        .map(|c| {
            let [x1, y1, x2, y2] = c.corners;
            DetectionResult::new(
                label_for(c.class_id),
                c.score.clamp(0.0, 1.0),
                BoundingBox::new(x1, y1, x2 - x1, y2 - y1),
            )
        })
        .collect()
}

fn corner_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
