pub mod camera_session;
pub mod detection_loop;
pub mod loop_logger;
pub mod session_error;
pub mod session_state;

#[cfg(test)]
pub(crate) mod fakes;
