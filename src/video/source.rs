//! Visual sources: webcam and screen
//!
//! A source hands out still RGBA frames on demand. Screen sources may also
//! report that sharing was ended from outside the client.

use tokio::sync::oneshot;

use crate::error::VideoError;

/// One uncompressed RGBA frame
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel
    pub data: Vec<u8>,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// A frame filled with one colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        Self::new(width, height, rgba.repeat(pixels))
    }
}

/// An acquired camera or screen
pub trait VisualSource: Send {
    /// Current native size, if known
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Sample the current frame
    fn grab_frame(&mut self) -> Result<RgbaFrame, VideoError>;

    /// Release the device. Idempotent.
    fn stop(&mut self);

    /// Fires when the user stops sharing outside the client. Taken once.
    fn take_ended_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        None
    }
}

/// Acquires visual sources
pub trait VideoDevices: Send + Sync {
    fn open_webcam(&self, width: u32, height: u32) -> Result<Box<dyn VisualSource>, VideoError>;

    fn open_screen(&self) -> Result<Box<dyn VisualSource>, VideoError>;
}

/// Host devices: screen capture through xcap when built with the `screen`
/// feature. No camera backend is bundled; inject one through
/// [`VideoDevices`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVideoDevices;

impl VideoDevices for SystemVideoDevices {
    fn open_webcam(&self, _width: u32, _height: u32) -> Result<Box<dyn VisualSource>, VideoError> {
        Err(VideoError::DeviceUnavailable("no camera backend available".to_string()))
    }

    #[cfg(feature = "screen")]
    fn open_screen(&self) -> Result<Box<dyn VisualSource>, VideoError> {
        Ok(Box::new(screen::ScreenSource::primary()?))
    }

    #[cfg(not(feature = "screen"))]
    fn open_screen(&self) -> Result<Box<dyn VisualSource>, VideoError> {
        Err(VideoError::DeviceUnavailable(
            "built without screen capture support".to_string(),
        ))
    }
}

#[cfg(feature = "screen")]
mod screen {
    use tokio::sync::oneshot;
    use xcap::Monitor;

    use super::{RgbaFrame, VisualSource};
    use crate::error::VideoError;

    fn monitors() -> Result<Vec<Monitor>, VideoError> {
        Monitor::all().map_err(|e| {
            let message = e.to_string();
            if message.contains("permission") || message.contains("denied") {
                VideoError::DeviceUnavailable(format!("screen capture permission denied: {}", message))
            } else {
                VideoError::DeviceUnavailable(message)
            }
        })
    }

    /// Captures one monitor; sharing ends when that monitor disappears
    pub struct ScreenSource {
        monitor_name: String,
        width: u32,
        height: u32,
        ended_tx: Option<oneshot::Sender<()>>,
        ended_rx: Option<oneshot::Receiver<()>>,
        stopped: bool,
    }

    impl ScreenSource {
        /// The primary monitor, or the first one listed
        pub fn primary() -> Result<Self, VideoError> {
            let monitors = monitors()?;
            let monitor = monitors
                .iter()
                .find(|m| m.is_primary().unwrap_or(false))
                .or_else(|| monitors.first())
                .ok_or_else(|| VideoError::DeviceUnavailable("no monitors found".to_string()))?;

            let (ended_tx, ended_rx) = oneshot::channel();
            let source = Self {
                monitor_name: monitor.name().unwrap_or_default(),
                width: monitor.width().unwrap_or(0),
                height: monitor.height().unwrap_or(0),
                ended_tx: Some(ended_tx),
                ended_rx: Some(ended_rx),
                stopped: false,
            };
            tracing::info!(
                "Sharing screen '{}' ({}x{})",
                source.monitor_name,
                source.width,
                source.height
            );
            Ok(source)
        }

        fn signal_ended(&mut self) {
            if let Some(tx) = self.ended_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    impl VisualSource for ScreenSource {
        fn dimensions(&self) -> Option<(u32, u32)> {
            (self.width > 0 && self.height > 0).then_some((self.width, self.height))
        }

        fn grab_frame(&mut self) -> Result<RgbaFrame, VideoError> {
            if self.stopped {
                return Err(VideoError::NotActive);
            }

            let monitors = monitors()?;
            let Some(monitor) = monitors
                .iter()
                .find(|m| m.name().map(|n| n == self.monitor_name).unwrap_or(false))
            else {
                self.signal_ended();
                return Err(VideoError::Capture(format!(
                    "monitor '{}' is no longer available",
                    self.monitor_name
                )));
            };

            let image = monitor
                .capture_image()
                .map_err(|e| VideoError::Capture(e.to_string()))?;
            Ok(RgbaFrame::new(image.width(), image.height(), image.into_raw()))
        }

        fn stop(&mut self) {
            self.stopped = true;
            self.ended_tx = None;
        }

        fn take_ended_signal(&mut self) -> Option<oneshot::Receiver<()>> {
            self.ended_rx.take()
        }
    }
}
