pub mod detection_error;
pub mod detector_config;
pub mod object_detector;
