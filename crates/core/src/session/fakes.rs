//! Test doubles for camera, stream, detector and loader.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use crate::camera::domain::camera_error::CameraError;
use crate::camera::domain::frame_slot::FrameSlot;
use crate::camera::domain::media_stream::MediaStream;
use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::object_detector::{DetectorLoader, ObjectDetector};
use crate::shared::detection_result::{BoundingBox, DetectionResult};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

pub fn person_at(score: f64, x: f64, y: f64, width: f64, height: f64) -> DetectionResult {
    DetectionResult::new("person", score, BoundingBox::new(x, y, width, height))
}

/// Counts stream lifecycle calls across every stream sharing the probe.
#[derive(Clone, Default)]
pub struct StreamProbe {
    opens: Arc<AtomicUsize>,
    plays: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl StreamProbe {
    fn opened(&self) {
        let opens = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let live = opens - self.stops();
        self.max_live.fetch_max(live, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Most streams that were ever open at the same time.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

pub struct FakeStream {
    width: u32,
    height: u32,
    probe: StreamProbe,
    publish_on_play: bool,
    fail_metadata: bool,
    slot: Option<FrameSlot>,
}

impl FakeStream {
    /// Stream that never produces a frame.
    pub fn new(width: u32, height: u32, probe: StreamProbe) -> Self {
        Self {
            width,
            height,
            probe,
            publish_on_play: false,
            fail_metadata: false,
            slot: None,
        }
    }

    /// Publishes one black frame as soon as playback starts.
    pub fn with_frame(mut self) -> Self {
        self.publish_on_play = true;
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.fail_metadata = true;
        self
    }
}

impl MediaStream for FakeStream {
    fn wait_for_metadata(&mut self, _timeout: Duration) -> Result<VideoMetadata, CameraError> {
        if self.fail_metadata {
            return Err(CameraError::MetadataTimeout);
        }
        Ok(VideoMetadata {
            width: self.width,
            height: self.height,
            fps: 30.0,
            codec: "fake".into(),
            device: "fake0".into(),
        })
    }

    fn play(&mut self, slot: FrameSlot) -> Result<(), CameraError> {
        self.probe.plays.fetch_add(1, Ordering::SeqCst);
        if self.publish_on_play {
            let len = (self.width * self.height) as usize * Frame::CHANNELS;
            slot.publish(Frame::new(vec![0u8; len], self.width, self.height, 0));
        }
        self.slot = Some(slot);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(slot) = self.slot.take() {
            slot.clear();
        }
    }
}

enum CameraMode {
    Grant { with_frame: bool },
    Deny,
    NoMetadata,
}

pub struct FakeCamera {
    width: u32,
    height: u32,
    mode: CameraMode,
    probe: StreamProbe,
}

impl FakeCamera {
    pub fn granting(width: u32, height: u32, probe: StreamProbe) -> Self {
        Self {
            width,
            height,
            mode: CameraMode::Grant { with_frame: true },
            probe,
        }
    }

    pub fn granting_without_frames(width: u32, height: u32, probe: StreamProbe) -> Self {
        Self {
            mode: CameraMode::Grant { with_frame: false },
            ..Self::granting(width, height, probe)
        }
    }

    pub fn denying(probe: StreamProbe) -> Self {
        Self {
            mode: CameraMode::Deny,
            ..Self::granting(0, 0, probe)
        }
    }

    pub fn without_metadata(probe: StreamProbe) -> Self {
        Self {
            mode: CameraMode::NoMetadata,
            ..Self::granting(640, 480, probe)
        }
    }
}

impl CameraDevice for FakeCamera {
    fn open(&mut self, _constraints: &CameraConstraints) -> Result<Box<dyn MediaStream>, CameraError> {
        let stream = FakeStream::new(self.width, self.height, self.probe.clone());
        let stream = match self.mode {
            CameraMode::Deny => return Err(CameraError::PermissionDenied("denied".into())),
            CameraMode::Grant { with_frame: true } => stream.with_frame(),
            CameraMode::Grant { with_frame: false } => stream,
            CameraMode::NoMetadata => stream.without_metadata(),
        };
        self.probe.opened();
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        "fake camera".into()
    }
}

#[derive(Clone, Default)]
pub struct DetectorProbe {
    calls: Arc<AtomicUsize>,
}

impl DetectorProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FakeDetector {
    detections: Option<Vec<DetectionResult>>,
    probe: DetectorProbe,
    gate: Option<Receiver<()>>,
}

impl FakeDetector {
    pub fn returning(detections: Vec<DetectionResult>, probe: DetectorProbe) -> Self {
        Self {
            detections: Some(detections),
            probe,
            gate: None,
        }
    }

    pub fn failing(probe: DetectorProbe) -> Self {
        Self {
            detections: None,
            probe,
            gate: None,
        }
    }

    /// Each `detect` blocks until a message arrives on `gate`.
    pub fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl ObjectDetector for FakeDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>, DetectionError> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        self.detections
            .clone()
            .ok_or_else(|| DetectionError::Inference("fake failure".into()))
    }
}

pub struct FakeLoader {
    detections: Vec<DetectionResult>,
    detector_probe: DetectorProbe,
    fail: AtomicBool,
    loads: AtomicUsize,
}

impl FakeLoader {
    pub fn returning(detections: Vec<DetectionResult>, detector_probe: DetectorProbe) -> Self {
        Self {
            detections,
            detector_probe,
            fail: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let loader = Self::returning(vec![], DetectorProbe::default());
        loader.set_failing(true);
        loader
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DetectorLoader for FakeLoader {
    fn load(&self, _config: &DetectorConfig) -> Result<Box<dyn ObjectDetector>, DetectionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DetectionError::Load("fake model missing".into()));
        }
        Ok(Box::new(FakeDetector::returning(
            self.detections.clone(),
            self.detector_probe.clone(),
        )))
    }
}
