use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;

use super::detection_loop::{
    self, lock, EventQueue, LoopContext, LoopEvent, LoopHandle, RefreshSignal, SharedDetector,
};
use super::loop_logger::{LoopLogger, NullLoopLogger};
use super::session_error::SessionError;
use super::session_state::SessionState;
use crate::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use crate::camera::domain::capture_handle::CaptureHandle;
use crate::camera::domain::frame_slot::FrameSlot;
use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::object_detector::{DetectorLoader, ObjectDetector};
use crate::rendering::domain::draw_surface::DrawSurface;
use crate::shared::constants::DEFAULT_CAPTURE_FPS;
use crate::shared::video_metadata::VideoMetadata;

pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(5);

pub type LoggerFactory = Box<dyn Fn() -> Box<dyn LoopLogger> + Send>;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub constraints: CameraConstraints,
    pub detector: DetectorConfig,
    pub refresh: RefreshSignal,
    pub metadata_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            constraints: CameraConstraints::default(),
            detector: DetectorConfig::default(),
            refresh: RefreshSignal::per_second(DEFAULT_CAPTURE_FPS),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
        }
    }
}

/// Owns the camera, the loaded detector and the overlay surface for one
/// live detection session.
///
/// `start` and `stop` never fail: every failure becomes a
/// [`SessionState::Error`] the host can show. Dropping the session stops it.
pub struct CameraSession<S: DrawSurface + Send + 'static> {
    config: SessionConfig,
    device: Box<dyn CameraDevice>,
    loader: Arc<dyn DetectorLoader>,
    detector: Option<SharedDetector>,
    surface: Arc<Mutex<S>>,
    slot: FrameSlot,
    capture: Option<CaptureHandle>,
    detection_loop: Option<LoopHandle>,
    state: SessionState,
    metadata: Option<VideoMetadata>,
    events: EventQueue,
    logger_factory: LoggerFactory,
}

impl<S: DrawSurface + Send + 'static> CameraSession<S> {
    pub fn new(
        device: Box<dyn CameraDevice>,
        loader: Arc<dyn DetectorLoader>,
        surface: S,
        config: SessionConfig,
    ) -> Self {
        Self {
            config,
            device,
            loader,
            detector: None,
            surface: Arc::new(Mutex::new(surface)),
            slot: FrameSlot::new(),
            capture: None,
            detection_loop: None,
            state: SessionState::Uninitialized,
            metadata: None,
            events: EventQueue::default(),
            logger_factory: Box::new(|| Box::new(NullLoopLogger)),
        }
    }

    /// Builds a fresh logger for every loop the session starts.
    pub fn with_logger_factory(mut self, factory: LoggerFactory) -> Self {
        self.logger_factory = factory;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Overlay surface. Lock it to read what the loop has drawn.
    pub fn surface(&self) -> Arc<Mutex<S>> {
        self.surface.clone()
    }

    /// Slot the live video is published into.
    pub fn slot(&self) -> FrameSlot {
        self.slot.clone()
    }

    /// Per-cycle loop reports, bounded and newest-first when unread. Each
    /// `start` begins with an empty queue.
    pub fn events(&self) -> Receiver<LoopEvent> {
        self.events.receiver()
    }

    pub fn loader(&self) -> Arc<dyn DetectorLoader> {
        self.loader.clone()
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        &self.config.detector
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Metadata of the running capture.
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn describe_device(&self) -> String {
        self.device.describe()
    }

    /// Swaps the capture device. A running capture is stopped first.
    pub fn set_device(&mut self, device: Box<dyn CameraDevice>) {
        self.stop();
        self.device = device;
    }

    /// Loads the detector on the calling thread. Returns whether a
    /// detector is available afterwards.
    pub fn load_detector(&mut self) -> bool {
        if matches!(self.state, SessionState::ModelLoading) {
            return false;
        }
        self.begin_loading();
        let result = self.loader.load(&self.config.detector);
        self.finish_loading(result);
        self.has_detector()
    }

    /// Marks a load as in progress, for hosts that run
    /// [`DetectorLoader::load`] on a worker thread.
    pub fn begin_loading(&mut self) {
        self.stop();
        self.detector = None;
        self.state = SessionState::ModelLoading;
        log::info!("Loading detection model {}", self.config.detector.model_name);
    }

    /// Completes a load started with [`CameraSession::begin_loading`].
    pub fn finish_loading(&mut self, result: Result<Box<dyn ObjectDetector>, DetectionError>) {
        match result {
            Ok(detector) => {
                self.detector = Some(Arc::new(Mutex::new(detector)));
                self.state = SessionState::Idle;
                log::info!("Detection model ready");
            }
            Err(e) => {
                log::error!("Failed to load detection model: {e}");
                self.detector = None;
                self.state = SessionState::Error(SessionError::ModelLoad(e.to_string()));
            }
        }
    }

    /// Acquires the camera and starts the detection loop.
    ///
    /// A running capture is stopped first. Without a loaded detector the
    /// model is reloaded before the camera is touched.
    pub fn start(&mut self) {
        if !self.state.can_start() {
            log::debug!("Start ignored while the model is loading");
            return;
        }
        if self.state.is_active() {
            self.stop();
        }

        if self.detector.is_none() && !self.load_detector() {
            return;
        }
        let Some(detector) = self.detector.clone() else {
            return;
        };

        let stream = match self.device.open(&self.config.constraints) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Camera {} unavailable: {e}", self.device.describe());
                self.state = SessionState::Error(SessionError::CameraPermission);
                return;
            }
        };

        let mut capture = CaptureHandle::new(stream, self.slot.clone());
        let metadata = match capture.attach(self.config.metadata_timeout) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Camera {} failed to start: {e}", self.device.describe());
                capture.release();
                self.state = SessionState::Error(SessionError::CameraPermission);
                return;
            }
        };

        {
            let mut surface = lock(&self.surface);
            surface.resize(metadata.width, metadata.height);
            surface.clear();
        }

        log::info!(
            "Camera {} active ({}x{} @ {:.1} fps)",
            metadata.device,
            metadata.width,
            metadata.height,
            metadata.fps
        );

        self.capture = Some(capture);
        self.metadata = Some(metadata);
        self.events.clear();
        self.detection_loop = Some(detection_loop::spawn(LoopContext {
            detector,
            slot: self.slot.clone(),
            surface: self.surface.clone(),
            refresh: self.config.refresh.clone(),
            events: self.events.clone(),
            logger: (self.logger_factory)(),
        }));
        self.state = SessionState::Active;
    }

    /// Releases the camera, cancels the loop and clears the overlay.
    ///
    /// Safe to call in any state and any number of times. Returns once the
    /// loop thread has exited, so no event or drawing follows it. Active
    /// and dismissible errors settle in Idle; a model load error stays
    /// visible because there is no detector to be idle with.
    pub fn stop(&mut self) {
        let detection_loop = {
            let mut surface = lock(&self.surface);
            let mut detection_loop = self.detection_loop.take();
            if let Some(handle) = detection_loop.as_mut() {
                handle.cancel();
            }
            surface.clear();
            detection_loop
        };
        // Outside the surface lock: a cycle in flight needs it to notice
        // the cancel.
        if let Some(handle) = detection_loop {
            handle.join();
        }

        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
        self.metadata = None;

        let settles_idle = match &self.state {
            SessionState::Active => true,
            SessionState::Error(err) => err.is_dismissible() && self.detector.is_some(),
            _ => false,
        };
        if settles_idle {
            self.state = SessionState::Idle;
            log::info!("Camera session stopped");
        }
    }

    /// Clears a dismissible error. Returns whether the state changed.
    pub fn dismiss_error(&mut self) -> bool {
        match &self.state {
            SessionState::Error(err) if err.is_dismissible() => {
                self.state = if self.detector.is_some() {
                    SessionState::Idle
                } else {
                    SessionState::Uninitialized
                };
                true
            }
            _ => false,
        }
    }
}

impl<S: DrawSurface + Send + 'static> Drop for CameraSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::domain::result_renderer::PERSON_COLOR;
    use crate::rendering::infrastructure::overlay_canvas::{DrawCommand, OverlayCanvas};
    use crate::session::fakes::{person_at, DetectorProbe, FakeCamera, FakeLoader, StreamProbe};
    use crate::shared::detection_result::{BoundingBox, DetectionResult};
    use crate::shared::frame::Frame;
    use crossbeam_channel::Sender;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        session: CameraSession<OverlayCanvas>,
        ticks: Sender<Instant>,
        stream: StreamProbe,
        detector: DetectorProbe,
        loader: Arc<FakeLoader>,
    }

    impl Fixture {
        fn new(camera: fn(StreamProbe) -> FakeCamera, detections: Vec<DetectionResult>) -> Self {
            let stream = StreamProbe::default();
            let detector = DetectorProbe::default();
            let loader = Arc::new(FakeLoader::returning(detections, detector.clone()));
            let (ticks, tick_rx) = crossbeam_channel::bounded(0);
            let config = SessionConfig {
                refresh: RefreshSignal::External(tick_rx),
                ..SessionConfig::default()
            };
            let session = CameraSession::new(
                Box::new(camera(stream.clone())),
                loader.clone(),
                OverlayCanvas::new(0, 0),
                config,
            );
            Self {
                session,
                ticks,
                stream,
                detector,
                loader,
            }
        }

        fn tick(&self) -> LoopEvent {
            self.ticks.send(Instant::now()).unwrap();
            self.session.events().recv_timeout(WAIT).unwrap()
        }

        fn blank(&self) -> bool {
            lock(&self.session.surface()).is_blank()
        }
    }

    fn vga(probe: StreamProbe) -> FakeCamera {
        FakeCamera::granting(640, 480, probe)
    }

    #[test]
    fn test_start_loads_model_and_goes_active() {
        let mut f = Fixture::new(vga, vec![]);
        f.session.start();

        assert_eq!(f.session.state(), &SessionState::Active);
        assert!(f.session.has_detector());
        assert!(f.session.is_capturing());
        assert_eq!(f.loader.loads(), 1);
        assert_eq!(f.stream.plays(), 1);
        assert_eq!(lock(&f.session.surface()).dimensions(), (640, 480));
        assert_eq!(f.session.metadata().map(|m| m.width), Some(640));
    }

    #[test]
    fn test_person_detection_is_drawn_green_with_label() {
        let mut f = Fixture::new(vga, vec![person_at(0.92, 10.0, 10.0, 100.0, 200.0)]);
        f.session.start();

        assert!(matches!(f.tick(), LoopEvent::FrameRendered { .. }));
        let surface = f.session.surface();
        let canvas = lock(&surface);
        let boxes: Vec<_> = canvas
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::StrokeRect { rect, color, .. } => Some((*rect, *color)),
                _ => None,
            })
            .collect();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1, PERSON_COLOR);
        assert_eq!(
            (boxes[0].0.x, boxes[0].0.y, boxes[0].0.width, boxes[0].0.height),
            (10.0, 10.0, 100.0, 200.0)
        );
        assert!(canvas
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::Text { text, .. } if text == "person 92%")));
    }

    #[test]
    fn test_low_confidence_detection_draws_nothing() {
        let dog = DetectionResult::new("dog", 0.55, BoundingBox::new(0.0, 0.0, 50.0, 50.0));
        let mut f = Fixture::new(vga, vec![dog]);
        f.session.start();

        assert!(matches!(f.tick(), LoopEvent::FrameRendered { .. }));
        assert!(f.blank());
    }

    #[test]
    fn test_permission_denied_sets_error_without_capture() {
        let mut f = Fixture::new(FakeCamera::denying, vec![]);
        f.session.start();

        let err = f.session.state().error().cloned().unwrap();
        assert_eq!(err, SessionError::CameraPermission);
        assert_eq!(
            err.to_string(),
            "Camera permission denied or camera not available."
        );
        assert!(!f.session.is_capturing());
        assert_eq!(f.stream.opens(), 0);
    }

    #[test]
    fn test_metadata_failure_releases_partial_capture() {
        let mut f = Fixture::new(FakeCamera::without_metadata, vec![]);
        f.session.start();

        assert_eq!(
            f.session.state(),
            &SessionState::Error(SessionError::CameraPermission)
        );
        assert!(!f.session.is_capturing());
        assert_eq!(f.stream.opens(), 1);
        assert_eq!(f.stream.stops(), 1);
    }

    #[test]
    fn test_restart_while_active_releases_previous_capture_first() {
        let mut f = Fixture::new(vga, vec![]);
        f.session.start();
        f.session.start();

        assert_eq!(f.session.state(), &SessionState::Active);
        assert_eq!(f.stream.opens(), 2);
        assert_eq!(f.stream.stops(), 1);
        assert_eq!(f.stream.max_live(), 1);
        assert_eq!(f.loader.loads(), 1);
        assert!(matches!(f.tick(), LoopEvent::FrameRendered { .. }));
    }

    #[test]
    fn test_tick_before_first_frame_is_a_no_op() {
        let mut f = Fixture::new(
            |probe| FakeCamera::granting_without_frames(64, 48, probe),
            vec![person_at(0.9, 1.0, 1.0, 10.0, 10.0)],
        );
        f.session.start();

        assert_eq!(f.tick(), LoopEvent::NoFrame);
        assert_eq!(f.detector.calls(), 0);
        assert!(f.blank());

        f.session
            .slot()
            .publish(Frame::new(vec![0u8; 64 * 48 * 3], 64, 48, 1));
        assert!(matches!(f.tick(), LoopEvent::FrameRendered { .. }));
        assert_eq!(f.detector.calls(), 1);
    }

    #[test]
    fn test_stop_releases_once_and_blanks_surface() {
        let mut f = Fixture::new(vga, vec![person_at(0.92, 10.0, 10.0, 100.0, 200.0)]);
        f.session.start();
        f.tick();
        assert!(!f.blank());

        f.session.stop();
        assert_eq!(f.session.state(), &SessionState::Idle);
        assert!(f.blank());
        assert!(f.session.slot().latest().is_none());
        assert_eq!(f.stream.stops(), 1);

        f.session.stop();
        assert_eq!(f.session.state(), &SessionState::Idle);
        assert_eq!(f.stream.stops(), 1);
    }

    #[test]
    fn test_stop_cancels_loop() {
        let mut f = Fixture::new(vga, vec![person_at(0.9, 0.0, 0.0, 5.0, 5.0)]);
        f.session.start();
        f.session.stop();

        let _ = f
            .ticks
            .send_timeout(Instant::now(), Duration::from_millis(50));
        assert!(f
            .session
            .events()
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        assert_eq!(f.detector.calls(), 0);
        assert!(f.blank());
    }

    #[test]
    fn test_drop_releases_camera() {
        let f = Fixture::new(vga, vec![]);
        let Fixture {
            mut session,
            stream,
            ..
        } = f;
        session.start();
        drop(session);
        assert_eq!(stream.stops(), 1);
    }

    #[test]
    fn test_stop_before_start_keeps_uninitialized() {
        let mut f = Fixture::new(vga, vec![]);
        f.session.stop();
        f.session.stop();
        assert_eq!(f.session.state(), &SessionState::Uninitialized);
        assert_eq!(f.stream.stops(), 0);
    }

    #[test]
    fn test_stop_after_camera_error_settles_idle() {
        let mut f = Fixture::new(FakeCamera::denying, vec![]);
        f.session.start();
        assert_eq!(
            f.session.state(),
            &SessionState::Error(SessionError::CameraPermission)
        );

        f.session.stop();
        assert_eq!(f.session.state(), &SessionState::Idle);
        f.session.stop();
        assert_eq!(f.session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_stop_keeps_model_load_error() {
        let mut f = Fixture::new(vga, vec![]);
        f.loader.set_failing(true);
        f.session.start();
        f.session.stop();
        assert!(matches!(
            f.session.state(),
            SessionState::Error(SessionError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_restart_starts_with_empty_event_queue() {
        let mut f = Fixture::new(
            |probe| FakeCamera::granting_without_frames(64, 48, probe),
            vec![],
        );
        f.session.start();
        f.ticks.send(Instant::now()).unwrap();
        let deadline = Instant::now() + WAIT;
        while f.session.events().is_empty() {
            assert!(Instant::now() < deadline, "no event from the first session");
            std::thread::sleep(Duration::from_millis(1));
        }
        f.session.stop();
        assert!(!f.session.events().is_empty());

        f.session.start();
        assert!(f.session.events().try_recv().is_err());
        assert_eq!(f.tick(), LoopEvent::NoFrame);
        f.session.stop();
    }

    #[test]
    fn test_model_load_failure_then_retry_reloads() {
        let mut f = Fixture::new(vga, vec![]);
        f.loader.set_failing(true);
        f.session.start();

        assert!(matches!(
            f.session.state(),
            SessionState::Error(SessionError::ModelLoad(_))
        ));
        assert_eq!(f.stream.opens(), 0);
        assert!(!f.session.dismiss_error());

        f.loader.set_failing(false);
        f.session.start();
        assert_eq!(f.session.state(), &SessionState::Active);
        assert_eq!(f.loader.loads(), 2);
    }

    #[test]
    fn test_dismiss_camera_error_returns_to_idle() {
        let mut f = Fixture::new(FakeCamera::denying, vec![]);
        f.session.start();
        assert!(f.session.dismiss_error());
        assert_eq!(f.session.state(), &SessionState::Idle);
        assert!(!f.session.dismiss_error());
    }

    #[test]
    fn test_background_loading_flow() {
        let mut f = Fixture::new(vga, vec![]);
        f.session.begin_loading();
        assert_eq!(f.session.state(), &SessionState::ModelLoading);

        f.session.start();
        assert_eq!(f.session.state(), &SessionState::ModelLoading);
        assert_eq!(f.stream.opens(), 0);

        let loaded = f.session.loader().load(f.session.detector_config());
        f.session.finish_loading(loaded);
        assert_eq!(f.session.state(), &SessionState::Idle);

        f.session.start();
        assert!(f.session.state().is_active());
    }

    #[test]
    fn test_failed_background_load_is_model_error() {
        let loader = FakeLoader::failing();
        let mut f = Fixture::new(vga, vec![]);
        f.session.begin_loading();
        f.session.finish_loading(loader.load(&DetectorConfig::default()));
        assert!(matches!(
            f.session.state(),
            SessionState::Error(SessionError::ModelLoad(msg)) if msg.contains("fake model missing")
        ));
        assert!(!f.session.has_detector());
    }
}
