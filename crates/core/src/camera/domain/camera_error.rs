use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera available: {0}")]
    Unavailable(String),
    #[error("camera stream failed: {0}")]
    Stream(String),
    #[error("timed out waiting for camera metadata")]
    MetadataTimeout,
}
