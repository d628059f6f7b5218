use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::loop_logger::LoopLogger;
use super::session_error::SessionError;
use crate::camera::domain::frame_slot::FrameSlot;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::rendering::domain::draw_surface::DrawSurface;
use crate::rendering::domain::result_renderer;
use crate::shared::constants::{EVENT_QUEUE_CAPACITY, MAX_CONSECUTIVE_FAILURES};
use crate::shared::detection_result::DetectionResult;
use crate::shared::frame::Frame;

pub type SharedDetector = Arc<Mutex<Box<dyn ObjectDetector>>>;

/// Source of loop ticks, one cycle per tick.
#[derive(Clone, Debug)]
pub enum RefreshSignal {
    /// Fixed-rate timer.
    Interval(Duration),
    /// Ticks sent by the host, e.g. once per displayed GUI frame.
    External(Receiver<Instant>),
}

impl RefreshSignal {
    /// Timer matching a display frame rate.
    pub fn per_second(rate: u32) -> Self {
        RefreshSignal::Interval(Duration::from_secs(1) / rate.max(1))
    }

    fn into_receiver(self) -> Receiver<Instant> {
        match self {
            RefreshSignal::Interval(period) => crossbeam_channel::tick(period),
            RefreshSignal::External(ticks) => ticks,
        }
    }
}

/// What a loop reports back to its host after each cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    /// Tick fired before the camera produced a frame; nothing ran.
    NoFrame,
    FrameRendered {
        frame_index: usize,
        detections: Vec<DetectionResult>,
        latency: Duration,
    },
    FrameFailed {
        frame_index: usize,
        error: SessionError,
    },
    /// Sent once when a streak of failed cycles reaches
    /// [`MAX_CONSECUTIVE_FAILURES`]; the loop keeps running.
    PersistentFailure {
        consecutive: usize,
        error: SessionError,
    },
}

/// Bounded queue of loop events that keeps the newest ones.
///
/// When the host falls behind, the oldest queued event is dropped to make
/// room, so an unread queue never grows past its capacity.
#[derive(Clone, Debug)]
pub struct EventQueue {
    tx: Sender<LoopEvent>,
    rx: Receiver<LoopEvent>,
}

impl EventQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Host side of the queue.
    pub fn receiver(&self) -> Receiver<LoopEvent> {
        self.rx.clone()
    }

    pub fn push(&self, mut event: LoopEvent) {
        loop {
            match self.tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    event = rejected;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drops everything still queued.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::bounded(EVENT_QUEUE_CAPACITY)
    }
}

/// Everything a loop needs; moved into the worker thread.
pub struct LoopContext<S> {
    pub detector: SharedDetector,
    pub slot: FrameSlot,
    pub surface: Arc<Mutex<S>>,
    pub refresh: RefreshSignal,
    pub events: EventQueue,
    pub logger: Box<dyn LoopLogger>,
}

/// Owner side of a running loop.
///
/// Dropping the handle cancels the loop without waiting for it.
pub struct LoopHandle {
    cancelled: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// Cancels the next tick. A cycle already in flight finishes its
    /// detection call but renders nothing.
    ///
    /// Callers that need the no-render guarantee must hold the surface lock
    /// while cancelling.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.stop_tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels and waits for the worker to exit.
    pub fn join(mut self) {
        self.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Detection loop thread panicked");
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts the detect-and-render loop on its own thread.
pub fn spawn<S: DrawSurface + Send + 'static>(context: LoopContext<S>) -> LoopHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let flag = cancelled.clone();
    let worker = thread::spawn(move || run(context, flag, stop_rx));

    LoopHandle {
        cancelled,
        stop_tx: Some(stop_tx),
        worker: Some(worker),
    }
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run<S: DrawSurface>(context: LoopContext<S>, cancelled: Arc<AtomicBool>, stop_rx: Receiver<()>) {
    let LoopContext {
        detector,
        slot,
        surface,
        refresh,
        events,
        mut logger,
    } = context;
    let ticks = refresh.into_receiver();
    let mut consecutive_failures = 0usize;

    log::debug!("Detection loop started");
    loop {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => break,
            recv(ticks) -> tick => if tick.is_err() { break },
        }
        // Coalesce ticks that piled up during the previous cycle.
        while ticks.try_recv().is_ok() {}

        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let Some(frame) = slot.latest() else {
            events.push(LoopEvent::NoFrame);
            continue;
        };

        let outcome = run_cycle(&frame, &detector, &surface, &cancelled, logger.as_mut());
        let event = match outcome {
            CycleOutcome::Cancelled => break,
            CycleOutcome::Rendered {
                detections,
                latency,
            } => {
                consecutive_failures = 0;
                LoopEvent::FrameRendered {
                    frame_index: frame.index(),
                    detections,
                    latency,
                }
            }
            CycleOutcome::Failed(error) => {
                consecutive_failures += 1;
                log::warn!("Detection failed on frame {}: {error}", frame.index());
                LoopEvent::FrameFailed {
                    frame_index: frame.index(),
                    error,
                }
            }
        };

        let persistent = match &event {
            LoopEvent::FrameFailed { error, .. }
                if consecutive_failures == MAX_CONSECUTIVE_FAILURES =>
            {
                Some(error.clone())
            }
            _ => None,
        };
        events.push(event);
        if let Some(error) = persistent {
            logger.info(&format!(
                "{consecutive_failures} consecutive detection failures"
            ));
            events.push(LoopEvent::PersistentFailure {
                consecutive: consecutive_failures,
                error,
            });
        }
    }

    logger.summary();
    log::debug!("Detection loop stopped");
}

enum CycleOutcome {
    Cancelled,
    Rendered {
        detections: Vec<DetectionResult>,
        latency: Duration,
    },
    Failed(SessionError),
}

fn run_cycle<S: DrawSurface>(
    frame: &Frame,
    detector: &SharedDetector,
    surface: &Mutex<S>,
    cancelled: &AtomicBool,
    logger: &mut dyn LoopLogger,
) -> CycleOutcome {
    {
        let mut surface = lock(surface);
        if cancelled.load(Ordering::SeqCst) {
            return CycleOutcome::Cancelled;
        }
        let (width, height) = frame.dimensions();
        if surface.dimensions() != (width, height) {
            log::debug!("Resizing overlay to {width}x{height}");
            surface.resize(width, height);
        }
    }

    let started = Instant::now();
    let result = lock(detector).detect(frame);
    let latency = started.elapsed();
    logger.timing("detect", latency.as_secs_f64() * 1000.0);

    let detections = match result {
        Ok(detections) => detections,
        Err(e) => {
            logger.cycle(false);
            return CycleOutcome::Failed(SessionError::FrameDetection(e.to_string()));
        }
    };

    let render_start = Instant::now();
    {
        let mut surface = lock(surface);
        // stop() raises the flag under this same lock.
        if cancelled.load(Ordering::SeqCst) {
            return CycleOutcome::Cancelled;
        }
        result_renderer::render(&mut *surface, &detections);
    }
    logger.timing("render", render_start.elapsed().as_secs_f64() * 1000.0);
    logger.metric("detections", detections.len() as f64);
    logger.cycle(true);

    CycleOutcome::Rendered {
        detections,
        latency,
    }
}
