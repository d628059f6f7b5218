use super::camera_error::CameraError;
use super::media_stream::MediaStream;
use crate::shared::constants::{DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH};

/// Preferred capture settings. Devices treat these as hints and report the
/// real values through the stream metadata. Capture is always video-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            ideal_width: DEFAULT_CAPTURE_WIDTH,
            ideal_height: DEFAULT_CAPTURE_HEIGHT,
            frame_rate: DEFAULT_CAPTURE_FPS,
        }
    }
}

/// Host capability that grants access to a capture device.
///
/// `open` may block while the OS asks the user for permission.
pub trait CameraDevice: Send {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn MediaStream>, CameraError>;

    /// Human-readable device name for status text and logs.
    fn describe(&self) -> String;
}
