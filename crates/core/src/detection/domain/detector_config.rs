use std::path::PathBuf;

use crate::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};

/// Provider-side candidate filter; the overlay applies its own fixed
/// threshold on top.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.25;

/// NMS IoU threshold.
pub const DEFAULT_NMS_IOU: f64 = 0.45;

/// What to load and how to post-process its output.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Explicit model file. When unset the model is resolved by name.
    pub model_path: Option<PathBuf>,
    pub model_name: String,
    pub model_url: String,
    pub min_confidence: f64,
    pub nms_iou: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_name: YOLO_MODEL_NAME.to_string(),
            model_url: YOLO_MODEL_URL.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            nms_iou: DEFAULT_NMS_IOU,
        }
    }
}
