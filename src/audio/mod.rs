//! Audio subsystem: microphone capture, output contexts and playback

pub mod buffer;
pub mod capture;
pub mod device;
pub mod output;
pub mod playback;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{PlaybackChunk, PlaybackQueue};
pub use capture::{AudioCapture, CaptureStats, CpalMicrophone, Microphone};
pub use device::{list_devices, DeviceInfo};
pub use output::{AudioBuffer, CpalOutputFactory, OutputContext, OutputContextPool, OutputFactory, PlayingSource};
pub use playback::{AudioPlayback, PlaybackStats};
