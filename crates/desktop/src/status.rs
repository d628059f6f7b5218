use std::collections::VecDeque;
use std::time::{Duration, Instant};

use live_detect_core::session::detection_loop::LoopEvent;
use live_detect_core::session::session_error::SessionError;
use live_detect_core::shared::constants::RENDER_CONFIDENCE_THRESHOLD;

const FPS_WINDOW: Duration = Duration::from_secs(2);

/// Live statistics for the status bar, fed from loop events.
#[derive(Debug, Default)]
pub struct LoopStatus {
    rendered_at: VecDeque<Instant>,
    shown: usize,
    latency: Option<Duration>,
    waiting_for_frames: bool,
    persistent_failure: Option<SessionError>,
}

impl LoopStatus {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, event: LoopEvent, now: Instant) {
        match event {
            LoopEvent::NoFrame => self.waiting_for_frames = true,
            LoopEvent::FrameRendered {
                detections,
                latency,
                ..
            } => {
                self.waiting_for_frames = false;
                self.persistent_failure = None;
                self.shown = detections
                    .iter()
                    .filter(|d| d.score >= RENDER_CONFIDENCE_THRESHOLD)
                    .count();
                self.latency = Some(latency);
                self.rendered_at.push_back(now);
            }
            LoopEvent::FrameFailed { .. } => self.waiting_for_frames = false,
            LoopEvent::PersistentFailure { error, .. } => self.persistent_failure = Some(error),
        }
        while self
            .rendered_at
            .front()
            .is_some_and(|t| now.duration_since(*t) > FPS_WINDOW)
        {
            self.rendered_at.pop_front();
        }
    }

    /// Rendered frames per second over the recent window.
    pub fn fps(&self) -> f64 {
        match (self.rendered_at.front(), self.rendered_at.back()) {
            (Some(first), Some(last)) if self.rendered_at.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (self.rendered_at.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    pub fn persistent_failure(&self) -> Option<&SessionError> {
        self.persistent_failure.as_ref()
    }

    pub fn summary(&self) -> String {
        if self.waiting_for_frames {
            return "Waiting for camera...".to_string();
        }
        match self.latency {
            Some(latency) => format!(
                "{:.1} fps \u{00b7} {} object{} \u{00b7} {:.0} ms",
                self.fps(),
                self.shown,
                if self.shown == 1 { "" } else { "s" },
                latency.as_secs_f64() * 1000.0
            ),
            None => "Starting...".to_string(),
        }
    }
}
