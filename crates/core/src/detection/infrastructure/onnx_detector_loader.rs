use std::path::PathBuf;
use std::sync::Arc;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::object_detector::{DetectorLoader, ObjectDetector};

use super::model_resolver;
use super::onnx_yolo_detector::OnnxYoloDetector;

/// Loads [`OnnxYoloDetector`]s, resolving (and if needed downloading) the
/// model file first.
#[derive(Default)]
pub struct OnnxDetectorLoader {
    bundled_dir: Option<PathBuf>,
    progress: Option<Arc<dyn Fn(u64, u64) + Send + Sync>>,
}

impl OnnxDetectorLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory searched after the user cache (development checkouts,
    /// packaged installs).
    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    /// Download progress callback, `(downloaded, total)` bytes, reported by
    /// every load that has to download.
    pub fn with_progress(mut self, progress: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    fn model_path(&self, config: &DetectorConfig) -> Result<PathBuf, DetectionError> {
        if let Some(path) = &config.model_path {
            return Ok(model_resolver::require_file(path)?);
        }
        let progress = self.progress.clone().map(|cb| {
            Box::new(move |downloaded: u64, total: u64| cb(downloaded, total)) as model_resolver::ProgressFn
        });
        Ok(model_resolver::resolve(
            &config.model_name,
            &config.model_url,
            self.bundled_dir.as_deref(),
            progress,
        )?)
    }
}

impl DetectorLoader for OnnxDetectorLoader {
    fn load(&self, config: &DetectorConfig) -> Result<Box<dyn ObjectDetector>, DetectionError> {
        let path = self.model_path(config)?;
        log::info!("Loading detection model from {}", path.display());

        let session = ort::session::Session::builder()
            .map_err(load_error)?
            .with_execution_providers(preferred_execution_providers())
            .map_err(load_error)?
            .commit_from_file(&path)
            .map_err(load_error)?;

        Ok(Box::new(OnnxYoloDetector::new(
            session,
            config.min_confidence,
            config.nms_iou,
        )))
    }
}

fn load_error(e: impl std::fmt::Display) -> DetectionError {
    DetectionError::Load(e.to_string())
}

/// CoreML on macOS, DirectML on Windows; elsewhere ONNX Runtime's CPU
/// provider is used.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
