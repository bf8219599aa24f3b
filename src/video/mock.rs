//! In-memory visual sources for video tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::VideoError;
use crate::video::source::{RgbaFrame, VideoDevices, VisualSource};

struct MockSource {
    dimensions: Option<(u32, u32)>,
    stopped: Arc<AtomicBool>,
    fail_grabs: Arc<AtomicUsize>,
    ended: Option<oneshot::Receiver<()>>,
}

impl VisualSource for MockSource {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn grab_frame(&mut self) -> Result<RgbaFrame, VideoError> {
        let failing = self
            .fail_grabs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VideoError::Capture("injected failure".into()));
        }
        let (width, height) = self.dimensions.unwrap_or((320, 240));
        Ok(RgbaFrame::solid(width, height, [200, 100, 50, 255]))
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn take_ended_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ended.take()
    }
}

/// Devices handing out solid-colour sources
pub struct MockVideoDevices {
    dimensions: Option<(u32, u32)>,
    camera: bool,
    webcam_stopped: Arc<AtomicBool>,
    screen_stopped: Arc<AtomicBool>,
    fail_grabs: Arc<AtomicUsize>,
    screen_ended: Mutex<Option<oneshot::Sender<()>>>,
}

impl MockVideoDevices {
    pub fn new() -> Arc<Self> {
        Self::with_dimensions(Some((32, 24)))
    }

    pub fn with_dimensions(dimensions: Option<(u32, u32)>) -> Arc<Self> {
        Arc::new(Self::unshared(dimensions))
    }

    pub fn without_camera() -> Arc<Self> {
        Arc::new(Self {
            camera: false,
            ..Self::unshared(Some((32, 24)))
        })
    }

    fn unshared(dimensions: Option<(u32, u32)>) -> Self {
        Self {
            dimensions,
            camera: true,
            webcam_stopped: Arc::new(AtomicBool::new(false)),
            screen_stopped: Arc::new(AtomicBool::new(false)),
            fail_grabs: Arc::new(AtomicUsize::new(0)),
            screen_ended: Mutex::new(None),
        }
    }

    /// Simulate the user stopping the share from the OS
    pub fn end_screen_share(&self) {
        if let Some(tx) = self.screen_ended.lock().take() {
            let _ = tx.send(());
        }
    }

    pub fn fail_next_grabs(&self, count: usize) {
        self.fail_grabs.store(count, Ordering::SeqCst);
    }

    pub fn webcam_stopped(&self) -> bool {
        self.webcam_stopped.load(Ordering::SeqCst)
    }

    pub fn screen_stopped(&self) -> bool {
        self.screen_stopped.load(Ordering::SeqCst)
    }
}

impl VideoDevices for MockVideoDevices {
    fn open_webcam(&self, _width: u32, _height: u32) -> Result<Box<dyn VisualSource>, VideoError> {
        if !self.camera {
            return Err(VideoError::DeviceUnavailable("permission denied".into()));
        }
        self.webcam_stopped.store(false, Ordering::SeqCst);
        Ok(Box::new(MockSource {
            dimensions: self.dimensions,
            stopped: self.webcam_stopped.clone(),
            fail_grabs: self.fail_grabs.clone(),
            ended: None,
        }))
    }

    fn open_screen(&self) -> Result<Box<dyn VisualSource>, VideoError> {
        let (tx, rx) = oneshot::channel();
        *self.screen_ended.lock() = Some(tx);
        self.screen_stopped.store(false, Ordering::SeqCst);
        Ok(Box::new(MockSource {
            dimensions: self.dimensions,
            stopped: self.screen_stopped.clone(),
            fail_grabs: self.fail_grabs.clone(),
            ended: Some(rx),
        }))
    }
}
