use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use iced::widget::{button, canvas, checkbox, column, container, image, pick_list, row, stack, text, Space};
use iced::{Alignment, Background, ContentFit, Element, Length, Subscription, Task, Theme};

use live_detect_core::camera::domain::camera_device::{CameraConstraints, CameraDevice};
use live_detect_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use live_detect_core::camera::infrastructure::still_image_camera::StillImageCamera;
use live_detect_core::detection::domain::detection_error::DetectionError;
use live_detect_core::detection::domain::detector_config::DetectorConfig;
use live_detect_core::detection::infrastructure::onnx_detector_loader::OnnxDetectorLoader;
use live_detect_core::rendering::infrastructure::overlay_canvas::OverlayCanvas;
use live_detect_core::session::camera_session::{CameraSession, SessionConfig};
use live_detect_core::session::detection_loop::{LoopEvent, RefreshSignal};
use live_detect_core::session::session_state::SessionState;

use crate::overlay::OverlayView;
use crate::settings::{Appearance, Settings};
use crate::status::LoopStatus;
use crate::theme;
use crate::workers::model_loader::{self, LoaderMessage};

const LOADER_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum Message {
    StartCamera,
    StopCamera,
    DismissError,
    Frame(Instant),
    PollLoader,
    AppearanceChanged(Appearance),
    HighContrastChanged(bool),
    PollSystemTheme,
}

pub struct App {
    settings: Settings,
    session: CameraSession<OverlayCanvas>,
    ticks: Sender<Instant>,
    events: Receiver<LoopEvent>,
    loader_rx: Option<Receiver<LoaderMessage>>,
    progress_rx: Receiver<(u64, u64)>,
    download: Option<(u64, u64)>,
    start_after_load: bool,
    video: Option<(usize, image::Handle)>,
    overlay: OverlayView,
    status: LoopStatus,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let settings = Settings::load();

        let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
        let loader = OnnxDetectorLoader::new().with_progress(move |downloaded, total| {
            let _ = progress_tx.send((downloaded, total));
        });

        // One pending tick at most: redraws that arrive mid-detection are dropped.
        let (ticks, tick_rx) = crossbeam_channel::bounded(1);
        let session = CameraSession::new(
            build_device(&settings),
            Arc::new(loader),
            OverlayCanvas::default(),
            session_config(&settings, tick_rx),
        );
        let events = session.events();

        let mut app = Self {
            settings,
            session,
            ticks,
            events,
            loader_rx: None,
            progress_rx,
            download: None,
            start_after_load: false,
            video: None,
            overlay: OverlayView::default(),
            status: LoopStatus::default(),
        };
        app.load_model_in_background();
        (app, Task::none())
    }

    fn load_model_in_background(&mut self) {
        self.session.begin_loading();
        self.download = None;
        self.loader_rx = Some(model_loader::spawn(
            self.session.loader(),
            self.session.detector_config().clone(),
        ));
    }

    fn start_session(&mut self) {
        self.status.reset();
        self.video = None;
        self.overlay.clear();
        self.session.start();
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::StartCamera => match self.session.state() {
                SessionState::ModelLoading => self.start_after_load = true,
                _ if !self.session.has_detector() => {
                    self.start_after_load = true;
                    self.load_model_in_background();
                }
                _ => self.start_session(),
            },
            Message::StopCamera => {
                self.start_after_load = false;
                self.session.stop();
                self.video = None;
                self.overlay.clear();
                self.status.reset();
            }
            Message::DismissError => {
                self.session.dismiss_error();
            }
            Message::PollLoader => self.poll_loader(),
            Message::Frame(now) => self.on_frame(now),
            Message::AppearanceChanged(appearance) => {
                self.settings.appearance = appearance;
                self.settings.save();
            }
            Message::HighContrastChanged(enabled) => {
                self.settings.high_contrast = enabled;
                self.settings.save();
            }
            Message::PollSystemTheme => {
                // theme() re-resolves on every redraw.
            }
        }
        Task::none()
    }

    fn poll_loader(&mut self) {
        let Some(rx) = &self.loader_rx else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(LoaderMessage::Finished(result)) => result,
            Err(TryRecvError::Empty) => {
                if let Some(progress) = model_loader::latest_progress(&self.progress_rx) {
                    self.download = Some(progress);
                }
                return;
            }
            Err(TryRecvError::Disconnected) => Err(DetectionError::Load(
                "model loader stopped unexpectedly".into(),
            )),
        };

        self.loader_rx = None;
        self.download = None;
        self.session.finish_loading(result);
        if std::mem::take(&mut self.start_after_load) && self.session.has_detector() {
            self.start_session();
        }
    }

    fn on_frame(&mut self, now: Instant) {
        if !self.session.state().is_active() {
            return;
        }
        // Full means the loop already has a tick waiting.
        let _ = self.ticks.try_send(now);

        for event in self.events.try_iter() {
            self.status.record(event, now);
        }

        match self.session.slot().latest() {
            Some(frame) => {
                let stale = self
                    .video
                    .as_ref()
                    .map_or(true, |(index, _)| *index != frame.index());
                if stale {
                    let handle =
                        image::Handle::from_rgba(frame.width(), frame.height(), frame.to_rgba());
                    self.video = Some((frame.index(), handle));
                }
            }
            // Stream ended underneath us.
            None => self.video = None,
        }

        let surface = self.session.surface();
        let canvas = surface.lock().unwrap_or_else(PoisonError::into_inner);
        self.overlay.capture(&canvas);
    }

    pub fn view(&self) -> Element<'_, Message> {
        let state = self.session.state();

        let start = button(text("Start Camera"))
            .on_press_maybe(state.can_start().then_some(Message::StartCamera))
            .style(button::primary)
            .padding([6, 14]);
        let stop = button(text("Stop Camera"))
            .on_press_maybe(state.is_active().then_some(Message::StopCamera))
            .style(button::secondary)
            .padding([6, 14]);

        let controls = row![
            start,
            stop,
            Space::new().width(Length::Fill),
            text(self.status_text()).size(13),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let mut content = column![controls].spacing(10);
        if let Some(message) = self.message_area() {
            content = content.push(message);
        }
        content = content.push(self.video_area());
        content = content.push(self.appearance_row());

        container(content).padding(16).into()
    }

    fn status_text(&self) -> String {
        match self.session.state() {
            SessionState::Active => format!(
                "{} \u{00b7} {}",
                self.session.describe_device(),
                self.status.summary()
            ),
            SessionState::ModelLoading => match self.download {
                Some((downloaded, total)) => model_loader::progress_text(downloaded, total),
                None => SessionState::ModelLoading.label().to_string(),
            },
            other => other.label().to_string(),
        }
    }

    fn message_area(&self) -> Option<Element<'_, Message>> {
        if let Some(err) = self.session.state().error() {
            let mut area = row![text(err.to_string()).style(text::danger)]
                .spacing(10)
                .align_y(Alignment::Center);
            if err.is_dismissible() {
                area = area.push(
                    button(text("Dismiss").size(12))
                        .on_press(Message::DismissError)
                        .style(button::text),
                );
            }
            return Some(area.into());
        }
        self.status
            .persistent_failure()
            .map(|err| text(err.to_string()).style(text::warning).into())
    }

    fn video_area(&self) -> Element<'_, Message> {
        let inner: Element<'_, Message> = match &self.video {
            Some((_, handle)) => stack![
                image(handle.clone())
                    .content_fit(ContentFit::Contain)
                    .width(Length::Fill)
                    .height(Length::Fill),
                canvas(&self.overlay).width(Length::Fill).height(Length::Fill),
            ]
            .into(),
            None => container(text(self.placeholder_text()).size(15))
                .center(Length::Fill)
                .into(),
        };

        container(inner)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|theme: &Theme| container::Style {
                background: Some(Background::Color(theme::video_background(theme))),
                ..container::Style::default()
            })
            .into()
    }

    fn placeholder_text(&self) -> &'static str {
        match self.session.state() {
            SessionState::ModelLoading => "Preparing the detection model...",
            SessionState::Active => "Waiting for camera...",
            SessionState::Idle => "Press Start Camera to begin.",
            SessionState::Uninitialized | SessionState::Error(_) => "Camera is off.",
        }
    }

    fn appearance_row(&self) -> Element<'_, Message> {
        row![
            text("Theme").size(13),
            pick_list(
                Appearance::ALL,
                Some(self.settings.appearance),
                Message::AppearanceChanged
            )
            .text_size(13),
            checkbox(self.settings.high_contrast)
                .label("High contrast")
                .on_toggle(Message::HighContrastChanged)
                .text_size(13),
        ]
        .spacing(12)
        .align_y(Alignment::Center)
        .into()
    }

    pub fn theme(&self) -> Theme {
        theme::resolve_theme(self.settings.appearance, self.settings.high_contrast)
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = Vec::new();
        if self.session.state().is_active() {
            subscriptions.push(iced::window::frames().map(Message::Frame));
        }
        if self.loader_rx.is_some() {
            subscriptions.push(iced::time::every(LOADER_POLL).map(|_| Message::PollLoader));
        }
        if self.settings.appearance == Appearance::System {
            subscriptions
                .push(iced::time::every(Duration::from_secs(2)).map(|_| Message::PollSystemTheme));
        }
        Subscription::batch(subscriptions)
    }
}

fn build_device(settings: &Settings) -> Box<dyn CameraDevice> {
    if let Some(path) = &settings.still_image {
        return Box::new(StillImageCamera::new(path));
    }
    match &settings.camera_device {
        Some(device) => Box::new(FfmpegCamera::new(device)),
        None => Box::new(FfmpegCamera::default()),
    }
}

fn session_config(settings: &Settings, ticks: Receiver<Instant>) -> SessionConfig {
    SessionConfig {
        constraints: CameraConstraints {
            ideal_width: settings.capture_width,
            ideal_height: settings.capture_height,
            frame_rate: settings.frame_rate,
        },
        detector: DetectorConfig {
            model_path: settings.model_path.clone(),
            model_url: settings.model_url.clone(),
            ..DetectorConfig::default()
        },
        refresh: RefreshSignal::External(ticks),
        ..SessionConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_session_config_follows_settings() {
        let settings = Settings {
            capture_width: 1280,
            capture_height: 720,
            frame_rate: 24,
            model_path: Some(PathBuf::from("/models/custom.onnx")),
            ..Settings::default()
        };
        let (_tx, rx) = crossbeam_channel::bounded(1);
        let config = session_config(&settings, rx);

        assert_eq!(config.constraints.ideal_width, 1280);
        assert_eq!(config.constraints.ideal_height, 720);
        assert_eq!(config.constraints.frame_rate, 24);
        assert_eq!(
            config.detector.model_path,
            Some(PathBuf::from("/models/custom.onnx"))
        );
        assert!(matches!(config.refresh, RefreshSignal::External(_)));
    }

    #[test]
    fn test_still_image_setting_replaces_camera() {
        let settings = Settings {
            still_image: Some(PathBuf::from("street.png")),
            ..Settings::default()
        };
        assert_eq!(build_device(&settings).describe(), "street.png");
    }

    #[test]
    fn test_camera_device_setting() {
        let settings = Settings {
            camera_device: Some("/dev/video3".into()),
            ..Settings::default()
        };
        assert!(build_device(&settings).describe().starts_with("/dev/video3"));
    }
}
