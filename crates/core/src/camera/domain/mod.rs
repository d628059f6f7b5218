pub mod camera_device;
pub mod camera_error;
pub mod capture_handle;
pub mod frame_slot;
pub mod media_stream;
