//! sentinel-hw — Camera hardware for the presence gate.
//!
//! V4L2 single-shot still capture with a settle interval, pixel-format
//! conversion and JPEG encoding.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::{PixelFormat, RawFrame};
pub use source::V4lCaptureSource;
