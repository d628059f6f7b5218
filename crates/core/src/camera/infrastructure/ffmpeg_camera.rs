use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use crate::camera::domain::camera_error::CameraError;
use crate::camera::domain::frame_slot::FrameSlot;
use crate::camera::domain::media_stream::MediaStream;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Capture device opened through libavdevice.
///
/// Uses the platform's capture demuxer (`v4l2` on Linux, `avfoundation` on
/// macOS, `dshow` on Windows). Only the video stream is ever opened.
pub struct FfmpegCamera {
    device: String,
    input_format: String,
}

impl FfmpegCamera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            input_format: platform_input_format().to_string(),
        }
    }

    /// Overrides the capture demuxer (e.g. `"v4l2"`).
    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    /// Default device identifier for the current platform.
    pub fn default_device() -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "0"
        }
        #[cfg(target_os = "windows")]
        {
            "video=Integrated Camera"
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            "/dev/video0"
        }
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new(Self::default_device())
    }
}

fn platform_input_format() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "avfoundation"
    }
    #[cfg(target_os = "windows")]
    {
        "dshow"
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        "v4l2"
    }
}

/// Demuxer names are comma-separated aliases, e.g. `"video4linux2,v4l2"`.
fn format_matches(format_name: &str, wanted: &str) -> bool {
    format_name.split(',').any(|alias| alias.trim() == wanted)
}

impl CameraDevice for FfmpegCamera {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        ffmpeg_next::init().map_err(|e| CameraError::Unavailable(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| format_matches(f.name(), &self.input_format))
            .ok_or_else(|| {
                CameraError::Unavailable(format!(
                    "capture format '{}' not available in this ffmpeg build",
                    self.input_format
                ))
            })?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set(
            "video_size",
            &format!("{}x{}", constraints.ideal_width, constraints.ideal_height),
        );
        options.set("framerate", &constraints.frame_rate.to_string());

        log::info!(
            "Opening camera {} via {} ({}x{} @ {} fps requested)",
            self.device,
            self.input_format,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.frame_rate
        );

        let context = ffmpeg_next::format::open_with(
            &self.device,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )
        .map_err(|e| map_open_error(&self.device, e))?;

        let ictx = match context {
            ffmpeg_next::format::context::Context::Input(ictx) => ictx,
            ffmpeg_next::format::context::Context::Output(_) => {
                return Err(CameraError::Unavailable(format!(
                    "{} did not open as an input",
                    self.device
                )))
            }
        };

        Ok(Box::new(FfmpegStream::new(ictx, self.device.clone())?))
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.device, self.input_format)
    }
}

fn map_open_error(device: &str, err: ffmpeg_next::Error) -> CameraError {
    let message = err.to_string();
    if message.to_lowercase().contains("permission") {
        CameraError::PermissionDenied(format!("{device}: {message}"))
    } else {
        CameraError::Unavailable(format!("{device}: {message}"))
    }
}

/// Demuxer, decoder and scaler for one open device.
struct CaptureContext {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: a CaptureContext is owned by exactly one thread at a time; it is
// built on the opening thread and moved wholesale into the capture thread.
unsafe impl Send for CaptureContext {}

/// Live stream from an [`FfmpegCamera`].
///
/// Decoding runs on a dedicated thread once `play` is called; `stop` joins
/// it and drops the demuxer, which closes the device.
pub struct FfmpegStream {
    context: Option<CaptureContext>,
    metadata: VideoMetadata,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegStream {
    fn new(ictx: ffmpeg_next::format::context::Input, device: String) -> Result<Self, CameraError> {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CameraError::Stream("no video stream on device".into()))?;

        let video_stream_index = stream.index();
        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| CameraError::Stream(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| CameraError::Stream(e.to_string()))?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            device,
        };

        Ok(Self {
            context: Some(CaptureContext {
                ictx,
                decoder,
                scaler,
                video_stream_index,
                width,
                height,
            }),
            metadata,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }
}

impl MediaStream for FfmpegStream {
    fn wait_for_metadata(&mut self, _timeout: Duration) -> Result<VideoMetadata, CameraError> {
        // Dimensions come from the codec parameters, which are known on open.
        if self.metadata.width == 0 || self.metadata.height == 0 {
            return Err(CameraError::MetadataTimeout);
        }
        Ok(self.metadata.clone())
    }

    fn play(&mut self, slot: FrameSlot) -> Result<(), CameraError> {
        let context = self
            .context
            .take()
            .ok_or_else(|| CameraError::Stream("stream already playing or stopped".into()))?;
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let worker = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || run_capture(context, slot, running))
            .map_err(|e| CameraError::Stream(e.to_string()))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Camera capture thread panicked");
            }
        }
        // Never played: closing the demuxer here releases the device.
        self.context = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(context: CaptureContext, slot: FrameSlot, running: Arc<AtomicBool>) {
    let CaptureContext {
        mut ictx,
        mut decoder,
        mut scaler,
        video_stream_index,
        width,
        height,
    } = context;
    let mut frame_index = 0usize;

    for (stream, packet) in ictx.packets() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if stream.index() != video_stream_index {
            continue;
        }
        if let Err(e) = decoder.send_packet(&packet) {
            log::debug!("Dropping undecodable camera packet: {e}");
            continue;
        }

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = scaler.run(&decoded, &mut rgb_frame) {
                log::warn!("Failed to convert camera frame: {e}");
                continue;
            }
            let pixels = extract_rgb_pixels(&rgb_frame, width, height);
            slot.publish(Frame::new(pixels, width, height, frame_index));
            frame_index += 1;
        }
    }
    finish_capture(&slot, &running, frame_index);
}

/// Ends a capture thread. A stream that ran dry while still wanted (device
/// unplugged, driver gone) empties the slot so readers stop seeing a frozen
/// frame. Returns whether the end was unexpected.
fn finish_capture(slot: &FrameSlot, running: &AtomicBool, frames: usize) -> bool {
    let unexpected = running.swap(false, Ordering::SeqCst);
    if unexpected {
        log::warn!("Camera stream ended after {frames} frames");
        slot.clear();
    } else {
        log::debug!("Camera capture thread exiting after {frames} frames");
    }
    unexpected
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_matches_aliases() {
        assert!(format_matches("video4linux2,v4l2", "v4l2"));
        assert!(format_matches("video4linux2,v4l2", "video4linux2"));
        assert!(format_matches("avfoundation", "avfoundation"));
        assert!(!format_matches("dshow", "v4l2"));
    }

    #[test]
    fn test_default_device_is_not_empty() {
        assert!(!FfmpegCamera::default_device().is_empty());
        assert!(!FfmpegCamera::default().describe().is_empty());
    }

    #[test]
    fn test_open_missing_device_returns_error() {
        let mut camera = FfmpegCamera::new("/nonexistent/video99");
        assert!(camera.open(&CameraConstraints::default()).is_err());
    }

    #[test]
    fn test_open_unknown_format_is_unavailable() {
        let mut camera = FfmpegCamera::new("/dev/video0").with_input_format("no-such-demuxer");
        let result = camera.open(&CameraConstraints::default());
        assert!(matches!(result, Err(CameraError::Unavailable(_))));
    }

    #[test]
    fn test_stream_ending_while_running_clears_slot() {
        let slot = FrameSlot::new();
        slot.publish(Frame::new(vec![0u8; 12], 2, 2, 41));
        let running = AtomicBool::new(true);

        assert!(finish_capture(&slot, &running, 42));
        assert!(slot.latest().is_none());
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_requested_stop_leaves_slot_to_owner() {
        let slot = FrameSlot::new();
        slot.publish(Frame::new(vec![0u8; 12], 2, 2, 3));
        let running = AtomicBool::new(false);

        assert!(!finish_capture(&slot, &running, 4));
        assert_eq!(slot.latest().unwrap().index(), 3);
    }

    #[test]
    fn test_extract_rgb_pixels_strips_padding() {
        ffmpeg_next::init().unwrap();
        let mut rgb = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            3,
            2,
        );
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for row in 0..2 {
            for col in 0..9 {
                data[row * stride + col] = (row * 10 + col) as u8;
            }
        }
        let pixels = extract_rgb_pixels(&rgb, 3, 2);
        assert_eq!(pixels.len(), 18);
        assert_eq!(pixels[0], 0);
        assert_eq!(pixels[9], 10);
        assert_eq!(pixels[17], 18);
    }
}
