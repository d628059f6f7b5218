use super::detection_error::DetectionError;
use super::detector_config::DetectorConfig;
use crate::shared::detection_result::DetectionResult;
use crate::shared::frame::Frame;

/// Detection provider: maps one frame to the objects found in it.
///
/// Boxes are in the frame's own pixel coordinates. `&mut self` because
/// runtimes keep per-session scratch state.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, DetectionError>;
}

/// Builds a ready-to-use [`ObjectDetector`]. Loading may download weights
/// and is expected to be slow.
pub trait DetectorLoader: Send + Sync {
    fn load(&self, config: &DetectorConfig) -> Result<Box<dyn ObjectDetector>, DetectionError>;
}
