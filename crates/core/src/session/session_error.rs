use thiserror::Error;

/// Failures a session reports to its host. Each one is carried as state,
/// never returned from `start`/`stop`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Failed to load detection model: {0}")]
    ModelLoad(String),
    #[error("Camera permission denied or camera not available.")]
    CameraPermission,
    #[error("Detection failed: {0}")]
    FrameDetection(String),
}

impl SessionError {
    /// Model load failures stay on screen until a start succeeds; the
    /// others can be dismissed by the user.
    pub fn is_dismissible(&self) -> bool {
        !matches!(self, SessionError::ModelLoad(_))
    }
}
