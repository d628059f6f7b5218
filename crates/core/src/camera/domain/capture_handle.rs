use std::time::Duration;

use super::camera_error::CameraError;
use super::frame_slot::FrameSlot;
use super::media_stream::MediaStream;
use crate::shared::video_metadata::VideoMetadata;

/// Exclusive ownership of one live stream plus the slot it is attached to.
///
/// Release happens exactly once: explicitly through [`CaptureHandle::release`]
/// or, failing that, on drop.
pub struct CaptureHandle {
    stream: Option<Box<dyn MediaStream>>,
    slot: FrameSlot,
    metadata: Option<VideoMetadata>,
}

impl CaptureHandle {
    pub fn new(stream: Box<dyn MediaStream>, slot: FrameSlot) -> Self {
        Self {
            stream: Some(stream),
            slot,
            metadata: None,
        }
    }

    /// Waits for stream metadata, then starts playback into the slot.
    pub fn attach(&mut self, timeout: Duration) -> Result<VideoMetadata, CameraError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::Stream("capture already released".into()))?;
        let metadata = stream.wait_for_metadata(timeout)?;
        stream.play(self.slot.clone())?;
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Stops all tracks and detaches the slot. Later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.slot.clear();
            log::info!("Camera released");
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fakes::{FakeStream, StreamProbe};
    use crate::shared::frame::Frame;

    #[test]
    fn test_attach_starts_playback_and_returns_metadata() {
        let probe = StreamProbe::default();
        let mut handle = CaptureHandle::new(
            Box::new(FakeStream::new(320, 240, probe.clone())),
            FrameSlot::new(),
        );
        let meta = handle.attach(Duration::from_millis(100)).unwrap();
        assert_eq!((meta.width, meta.height), (320, 240));
        assert_eq!(probe.plays(), 1);
        assert_eq!(handle.metadata(), Some(&meta));
    }

    #[test]
    fn test_release_stops_exactly_once() {
        let probe = StreamProbe::default();
        let mut handle = CaptureHandle::new(
            Box::new(FakeStream::new(320, 240, probe.clone())),
            FrameSlot::new(),
        );
        handle.release();
        handle.release();
        drop(handle);
        assert_eq!(probe.stops(), 1);
    }

    #[test]
    fn test_release_clears_slot() {
        let slot = FrameSlot::new();
        let mut handle = CaptureHandle::new(
            Box::new(FakeStream::new(2, 1, StreamProbe::default())),
            slot.clone(),
        );
        slot.publish(Frame::new(vec![0u8; 6], 2, 1, 0));
        handle.release();
        assert!(slot.latest().is_none());
        assert!(handle.is_released());
    }

    #[test]
    fn test_drop_releases() {
        let probe = StreamProbe::default();
        {
            let _handle = CaptureHandle::new(
                Box::new(FakeStream::new(2, 1, probe.clone())),
                FrameSlot::new(),
            );
        }
        assert_eq!(probe.stops(), 1);
    }

    #[test]
    fn test_attach_after_release_fails() {
        let mut handle = CaptureHandle::new(
            Box::new(FakeStream::new(2, 1, StreamProbe::default())),
            FrameSlot::new(),
        );
        handle.release();
        assert!(handle.attach(Duration::from_millis(10)).is_err());
    }
}
