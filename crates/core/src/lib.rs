//! Live object detection over a camera stream.
//!
//! The crate is split the usual way: `domain` modules hold the traits and
//! pure logic, `infrastructure` modules hold the ffmpeg / ONNX Runtime
//! implementations behind them.

pub mod camera;
pub mod detection;
pub mod rendering;
pub mod session;
pub mod shared;
