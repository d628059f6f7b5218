use std::time::Duration;

use super::camera_error::CameraError;
use super::frame_slot::FrameSlot;
use crate::shared::video_metadata::VideoMetadata;

/// A live, exclusively owned stream from a capture device.
///
/// Frames are published into a [`FrameSlot`] by the stream itself once
/// `play` has been called; readers only ever see the most recent one.
pub trait MediaStream: Send {
    /// Blocks until the stream knows its native dimensions.
    fn wait_for_metadata(&mut self, timeout: Duration) -> Result<VideoMetadata, CameraError>;

    /// Starts delivering frames into `slot`.
    fn play(&mut self, slot: FrameSlot) -> Result<(), CameraError>;

    /// Stops every track and releases the underlying device.
    fn stop(&mut self);
}
