use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use live_detect_core::detection::domain::detection_error::DetectionError;
use live_detect_core::detection::domain::detector_config::DetectorConfig;
use live_detect_core::detection::domain::object_detector::{DetectorLoader, ObjectDetector};

pub enum LoaderMessage {
    Finished(Result<Box<dyn ObjectDetector>, DetectionError>),
}

/// Runs `loader.load(config)` on a background thread. The result arrives as
/// a single [`LoaderMessage::Finished`].
pub fn spawn(loader: Arc<dyn DetectorLoader>, config: DetectorConfig) -> Receiver<LoaderMessage> {
    let (tx, rx) = crossbeam_channel::bounded::<LoaderMessage>(1);

    thread::spawn(move || run_load(&tx, loader.as_ref(), &config));

    rx
}

fn run_load(tx: &Sender<LoaderMessage>, loader: &dyn DetectorLoader, config: &DetectorConfig) {
    let result = loader.load(config);
    if let Err(e) = &result {
        log::warn!("Background model load failed: {e}");
    }
    let _ = tx.send(LoaderMessage::Finished(result));
}

/// Latest `(downloaded, total)` from a stream of progress reports.
pub fn latest_progress(rx: &Receiver<(u64, u64)>) -> Option<(u64, u64)> {
    rx.try_iter().last()
}

/// Status line for a model download.
pub fn progress_text(downloaded: u64, total: u64) -> String {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0).min(100.0) as u32;
        format!("Downloading model... {pct}%")
    } else {
        format!("Downloading model... {} KB", downloaded / 1024)
    }
}
