use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use live_detect_core::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use live_detect_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use live_detect_core::camera::infrastructure::still_image_camera::StillImageCamera;
use live_detect_core::detection::domain::detector_config::{DetectorConfig, DEFAULT_MIN_CONFIDENCE};
use live_detect_core::detection::infrastructure::onnx_detector_loader::OnnxDetectorLoader;
use live_detect_core::rendering::infrastructure::overlay_canvas::OverlayCanvas;
use live_detect_core::session::camera_session::{CameraSession, SessionConfig};
use live_detect_core::session::detection_loop::{LoopEvent, RefreshSignal};
use live_detect_core::session::loop_logger::StatsLoopLogger;
use live_detect_core::session::session_state::SessionState;
use live_detect_core::shared::constants::{
    DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH,
    RENDER_CONFIDENCE_THRESHOLD, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};

/// Live object detection from a camera (or a still image standing in for one).
#[derive(Parser)]
#[command(name = "live-detect")]
struct Cli {
    /// Capture device (defaults to the platform's first camera).
    #[arg(long)]
    device: Option<String>,

    /// Capture demuxer override (v4l2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// Use a still image instead of a camera.
    #[arg(long, conflicts_with = "device")]
    image: Option<PathBuf>,

    /// Preferred capture width.
    #[arg(long, default_value_t = DEFAULT_CAPTURE_WIDTH)]
    width: u32,

    /// Preferred capture height.
    #[arg(long, default_value_t = DEFAULT_CAPTURE_HEIGHT)]
    height: u32,

    /// Capture frame rate and detection rate.
    #[arg(long, default_value_t = DEFAULT_CAPTURE_FPS)]
    fps: u32,

    /// Local ONNX model file (skips the download).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Where to download the model from when it is not cached.
    #[arg(long, default_value = YOLO_MODEL_URL)]
    model_url: String,

    /// Detector candidate threshold (0.0-1.0); the overlay only shows
    /// results at 0.6 and above.
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,

    /// Stop after this many rendered frames.
    #[arg(long)]
    frames: Option<usize>,

    /// Stop after this many seconds.
    #[arg(long, default_value = "10")]
    duration: f64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = SessionConfig {
        constraints: CameraConstraints {
            ideal_width: cli.width,
            ideal_height: cli.height,
            frame_rate: cli.fps,
        },
        detector: DetectorConfig {
            model_path: cli.model.clone(),
            model_name: YOLO_MODEL_NAME.to_string(),
            model_url: cli.model_url.clone(),
            min_confidence: cli.min_confidence,
            ..DetectorConfig::default()
        },
        refresh: RefreshSignal::per_second(cli.fps),
        ..SessionConfig::default()
    };

    let loader = OnnxDetectorLoader::new().with_progress(download_progress);
    let mut session = CameraSession::new(
        build_device(&cli),
        Arc::new(loader),
        OverlayCanvas::default(),
        config,
    )
    .with_logger_factory(Box::new(|| Box::new(StatsLoopLogger::new(30))));

    log::info!("Starting camera {}", session.describe_device());
    session.start();
    if let SessionState::Error(err) = session.state() {
        return Err(err.to_string().into());
    }

    let events = session.events();
    let deadline = Instant::now() + Duration::from_secs_f64(cli.duration);
    let mut stats = RunStats::default();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match events.recv_timeout(remaining) {
            Ok(event) => stats.record(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
        if cli.frames.is_some_and(|limit| stats.rendered >= limit) {
            break;
        }
    }

    session.stop();
    println!("{}", stats.report());
    Ok(())
}

fn build_device(cli: &Cli) -> Box<dyn CameraDevice> {
    if let Some(image) = &cli.image {
        return Box::new(StillImageCamera::new(image));
    }
    let camera = match &cli.device {
        Some(device) => FfmpegCamera::new(device),
        None => FfmpegCamera::default(),
    };
    match &cli.input_format {
        Some(format) => Box::new(camera.with_input_format(format)),
        None => Box::new(camera),
    }
}

#[derive(Default)]
struct RunStats {
    rendered: usize,
    failed: usize,
    empty_ticks: usize,
    shown: usize,
    total_latency: Duration,
}

impl RunStats {
    fn record(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::NoFrame => self.empty_ticks += 1,
            LoopEvent::FrameRendered {
                frame_index,
                detections,
                latency,
            } => {
                self.rendered += 1;
                self.total_latency += latency;
                for det in detections
                    .iter()
                    .filter(|d| d.score >= RENDER_CONFIDENCE_THRESHOLD)
                {
                    self.shown += 1;
                    let b = &det.bbox;
                    log::info!(
                        "frame {frame_index}: {} at ({:.0}, {:.0}, {:.0}x{:.0})",
                        det.label_text(),
                        b.x,
                        b.y,
                        b.width,
                        b.height
                    );
                }
            }
            LoopEvent::FrameFailed { .. } => self.failed += 1,
            LoopEvent::PersistentFailure { consecutive, error } => {
                eprintln!("Warning: {consecutive} frames in a row failed: {error}");
            }
        }
    }

    fn report(&self) -> String {
        let avg_ms = if self.rendered > 0 {
            self.total_latency.as_secs_f64() * 1000.0 / self.rendered as f64
        } else {
            0.0
        };
        format!(
            "{} frames rendered, {} failed, {} ticks without a frame; {} boxes shown; avg detection {avg_ms:.1}ms",
            self.rendered, self.failed, self.empty_ticks, self.shown
        )
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(image) = &cli.image {
        if !image.exists() {
            return Err(format!("Image not found: {}", image.display()).into());
        }
        if !StillImageCamera::is_supported(image) {
            return Err(format!("Unsupported image format: {}", image.display()).into());
        }
    }
    if let Some(model) = &cli.model {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if cli.width == 0 || cli.height == 0 {
        return Err(format!("Resolution must be positive, got {}x{}", cli.width, cli.height).into());
    }
    if cli.fps == 0 {
        return Err("Frame rate must be positive".into());
    }
    if !(0.0..=1.0).contains(&cli.min_confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.min_confidence
        )
        .into());
    }
    if cli.duration <= 0.0 || !cli.duration.is_finite() {
        return Err(format!("Duration must be a positive number of seconds, got {}", cli.duration).into());
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use live_detect_core::session::session_error::SessionError;
    use live_detect_core::shared::detection_result::{BoundingBox, DetectionResult};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["live-detect"]);
        assert_eq!((cli.width, cli.height, cli.fps), (640, 480, 30));
        assert_eq!(cli.model_url, YOLO_MODEL_URL);
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn test_image_conflicts_with_device() {
        let result = Cli::try_parse_from(["live-detect", "--device", "/dev/video1", "--image", "a.png"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cli = Cli::parse_from(["live-detect", "--fps", "0"]);
        assert!(validate(&cli).is_err());
        let cli = Cli::parse_from(["live-detect", "--min-confidence", "1.5"]);
        assert!(validate(&cli).is_err());
        let cli = Cli::parse_from(["live-detect", "--duration", "0"]);
        assert!(validate(&cli).is_err());
        let cli = Cli::parse_from(["live-detect", "--image", "/nonexistent/x.png"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_stats_count_only_confident_boxes() {
        let mut stats = RunStats::default();
        stats.record(LoopEvent::NoFrame);
        stats.record(LoopEvent::FrameRendered {
            frame_index: 1,
            detections: vec![
                DetectionResult::new("person", 0.92, BoundingBox::new(10.0, 10.0, 100.0, 200.0)),
                DetectionResult::new("dog", 0.55, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
            ],
            latency: Duration::from_millis(20),
        });
        stats.record(LoopEvent::FrameFailed {
            frame_index: 2,
            error: SessionError::FrameDetection("x".into()),
        });

        assert_eq!(stats.rendered, 1);
        assert_eq!(stats.shown, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.empty_ticks, 1);
        assert!(stats.report().contains("avg detection 20.0ms"));
    }
}
