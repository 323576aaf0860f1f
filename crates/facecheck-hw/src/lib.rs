//! facecheck-hw — Camera access for the capture slot.
//!
//! V4L2 still capture, converted to RGB and exported as JPEG.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat, StillCapture};
pub use frame::Frame;
