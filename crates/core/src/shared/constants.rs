pub const YOLO_MODEL_NAME: &str = "yolo11n.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n.onnx";

/// Detections scoring below this are never drawn.
pub const RENDER_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// The one class that gets its own overlay color.
pub const PERSON_LABEL: &str = "person";

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

/// Consecutive failed detection cycles before the host is told about it.
pub const MAX_CONSECUTIVE_FAILURES: usize = 30;

/// Loop events held for a host that is not reading them.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
