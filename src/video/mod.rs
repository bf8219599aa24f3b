//! Video subsystem: visual sources and the frame-sending pipeline

pub mod capture;
pub mod source;

#[cfg(test)]
pub(crate) mod mock;

pub use capture::{VideoCapture, VideoStats};
pub use source::{RgbaFrame, SystemVideoDevices, VideoDevices, VisualSource};
