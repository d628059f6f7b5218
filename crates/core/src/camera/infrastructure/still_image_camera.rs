use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use crate::camera::domain::camera_error::CameraError;
use crate::camera::domain::frame_slot::FrameSlot;
use crate::camera::domain::media_stream::MediaStream;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Presents a still image file as a camera that always shows the same frame.
///
/// Lets the whole session run on machines without a capture device.
/// Constraints are ignored; the image keeps its native size.
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl CameraDevice for StillImageCamera {
    fn open(&mut self, _constraints: &CameraConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        if !Self::is_supported(&self.path) {
            return Err(CameraError::Unavailable(format!(
                "{} is not a supported image",
                self.path.display()
            )));
        }
        let img = image::open(&self.path)
            .map_err(|e| CameraError::Unavailable(format!("{}: {e}", self.path.display())))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        let codec = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        log::info!("Using still image {} ({width}x{height})", self.path.display());

        Ok(Box::new(StillImageStream {
            frame: Some(Frame::new(img.into_raw(), width, height, 0)),
            metadata: VideoMetadata {
                width,
                height,
                fps: 0.0,
                codec,
                device: self.path.display().to_string(),
            },
            slot: None,
        }))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

struct StillImageStream {
    frame: Option<Frame>,
    metadata: VideoMetadata,
    slot: Option<FrameSlot>,
}

impl MediaStream for StillImageStream {
    fn wait_for_metadata(&mut self, _timeout: Duration) -> Result<VideoMetadata, CameraError> {
        Ok(self.metadata.clone())
    }

    fn play(&mut self, slot: FrameSlot) -> Result<(), CameraError> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| CameraError::Stream("still image already played".into()))?;
        slot.publish(frame);
        self.slot = Some(slot);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.clear();
        }
        self.frame = None;
    }
}
