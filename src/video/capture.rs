//! Video capture pipeline
//!
//! Holds at most one visual source (webcam or screen) and, while streaming,
//! samples it on a fixed period, encodes each frame as JPEG and sends it as
//! a `video` message tagged with the source's mode.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::codec::JpegEncoder;
use crate::config::VideoConfig;
use crate::error::VideoError;
use crate::events::LiveEvent;
use crate::network::SessionManager;
use crate::protocol::{OutboundMessage, VideoMode};
use crate::video::source::{VideoDevices, VisualSource};

type SharedSource = Arc<Mutex<Box<dyn VisualSource>>>;

struct ActiveSource {
    source: SharedSource,
    mode: VideoMode,
    generation: u64,
}

#[derive(Default)]
struct VideoState {
    active: Option<ActiveSource>,
    generation: u64,
    stream_task: Option<JoinHandle<()>>,
    ended_watcher: Option<JoinHandle<()>>,
}

struct VideoInner {
    session: SessionManager,
    devices: Arc<dyn VideoDevices>,
    config: VideoConfig,
    state: Mutex<VideoState>,
    frames_sent: AtomicU64,
    frames_failed: AtomicU64,
}

/// Webcam / screen frame sender
#[derive(Clone)]
pub struct VideoCapture {
    inner: Arc<VideoInner>,
}

impl VideoCapture {
    pub fn new(session: SessionManager, devices: Arc<dyn VideoDevices>, config: VideoConfig) -> Self {
        Self {
            inner: Arc::new(VideoInner {
                session,
                devices,
                config,
                state: Mutex::new(VideoState::default()),
                frames_sent: AtomicU64::new(0),
                frames_failed: AtomicU64::new(0),
            }),
        }
    }

    /// Acquire the camera, replacing any active source
    pub fn start_webcam(&self) -> Result<(), VideoError> {
        self.stop_video();
        let config = &self.inner.config;
        let source = self
            .inner
            .devices
            .open_webcam(config.webcam_width, config.webcam_height)
            .map_err(|e| self.acquisition_failed(VideoMode::Webcam, e))?;

        self.activate(source, VideoMode::Webcam);
        Ok(())
    }

    /// Acquire a screen, replacing any active source
    pub fn start_screen_share(&self) -> Result<(), VideoError> {
        self.stop_video();
        let runtime = Handle::try_current().map_err(|_| VideoError::RuntimeUnavailable)?;
        let mut source = self
            .inner
            .devices
            .open_screen()
            .map_err(|e| self.acquisition_failed(VideoMode::Screen, e))?;

        let ended = source.take_ended_signal();
        let generation = self.activate(source, VideoMode::Screen);

        if let Some(ended) = ended {
            let weak = Arc::downgrade(&self.inner);
            let watcher = runtime.spawn(async move {
                if ended.await.is_err() {
                    return;
                }
                let Some(inner) = weak.upgrade() else { return };
                VideoCapture { inner }.screen_share_ended(generation);
            });
            self.inner.state.lock().ended_watcher = Some(watcher);
        }
        Ok(())
    }

    /// Start sending `frame_rate` frames per second. Needs an active source
    /// and an open session; replaces any running stream.
    pub fn start_video_stream(&self, frame_rate: u32) -> Result<(), VideoError> {
        if frame_rate == 0 {
            return Err(VideoError::InvalidFrameRate(frame_rate));
        }
        let runtime = Handle::try_current().map_err(|_| VideoError::RuntimeUnavailable)?;

        let mut state = self.inner.state.lock();
        let Some(active) = state.active.as_ref() else {
            tracing::error!("Cannot stream video: no active source");
            return Err(VideoError::NotActive);
        };
        if !self.inner.session.is_open() {
            tracing::error!("Cannot stream video: session not open");
            return Err(VideoError::NotConnected);
        }

        let source = active.source.clone();
        let mode = active.mode;
        let generation = active.generation;
        let (width, height) = source
            .lock()
            .dimensions()
            .unwrap_or((self.inner.config.fallback_width, self.inner.config.fallback_height));

        if let Some(task) = state.stream_task.take() {
            task.abort();
        }

        let period = Duration::from_secs_f64(1.0 / frame_rate as f64);
        let weak = Arc::downgrade(&self.inner);
        let quality = self.inner.config.jpeg_quality;
        state.stream_task = Some(runtime.spawn(async move {
            let mut encoder = JpegEncoder::new(quality);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let capture = VideoCapture { inner };
                if !capture.send_frame(&source, &mut encoder, mode, generation, width, height) {
                    tracing::debug!("Video stream cancelled");
                    break;
                }
            }
        }));

        tracing::info!(
            "Streaming {} video at {} fps ({}x{})",
            mode,
            frame_rate,
            width,
            height
        );
        Ok(())
    }

    /// Stop sending frames, keeping the source
    pub fn stop_video_stream(&self) {
        if let Some(task) = self.inner.state.lock().stream_task.take() {
            task.abort();
            tracing::debug!("Video stream stopped");
        }
    }

    /// Stop streaming and release the source
    pub fn stop_video(&self) {
        let (active, watcher) = {
            let mut state = self.inner.state.lock();
            if let Some(task) = state.stream_task.take() {
                task.abort();
            }
            (state.active.take(), state.ended_watcher.take())
        };

        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(active) = active {
            active.source.lock().stop();
            tracing::info!("Released {} source", active.mode);
        }
    }

    /// Release everything video-related. Idempotent.
    pub fn close(&self) {
        self.stop_video_stream();
        self.stop_video();
    }

    /// Mode of the active source, if any
    pub fn video_mode(&self) -> Option<VideoMode> {
        self.inner.state.lock().active.as_ref().map(|a| a.mode)
    }

    pub fn is_video_active(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner
            .state
            .lock()
            .stream_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn stats(&self) -> VideoStats {
        VideoStats {
            frames_sent: self.inner.frames_sent.load(Ordering::Relaxed),
            frames_failed: self.inner.frames_failed.load(Ordering::Relaxed),
        }
    }

    fn activate(&self, source: Box<dyn VisualSource>, mode: VideoMode) -> u64 {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        let generation = state.generation;
        state.active = Some(ActiveSource {
            source: Arc::new(Mutex::new(source)),
            mode,
            generation,
        });
        tracing::info!("Acquired {} source", mode);
        generation
    }

    fn acquisition_failed(&self, mode: VideoMode, error: VideoError) -> VideoError {
        tracing::error!("Failed to acquire {} source: {}", mode, error);
        self.inner
            .session
            .events()
            .emit(LiveEvent::LocalError(error.to_string()));
        error
    }

    fn screen_share_ended(&self, generation: u64) {
        let current = {
            let mut state = self.inner.state.lock();
            let current = state
                .active
                .as_ref()
                .is_some_and(|a| a.generation == generation);
            if current {
                // this task is the watcher; let it finish on its own
                state.ended_watcher = None;
            }
            current
        };
        if !current {
            return;
        }

        tracing::info!("User ended screen sharing");
        self.stop_video();
        self.inner.session.events().emit(LiveEvent::ScreenShareEnded);
    }

    /// One timer tick. Returns false when the stream should stop.
    fn send_frame(
        &self,
        source: &SharedSource,
        encoder: &mut JpegEncoder,
        mode: VideoMode,
        generation: u64,
        width: u32,
        height: u32,
    ) -> bool {
        let active = self
            .inner
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.generation == generation);
        if !active || !self.inner.session.is_open() {
            return false;
        }

        let frame = source.lock().grab_frame();
        let encoded = frame.and_then(|frame| {
            encoder
                .encode_base64(&frame, width, height)
                .map_err(VideoError::from)
        });

        let sent = encoded.and_then(|data| {
            self.inner
                .session
                .send(&OutboundMessage::Video { data, mode })
                .map_err(|_| VideoError::NotConnected)
        });

        match sent {
            Ok(()) => {
                self.inner.frames_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.inner.frames_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Error capturing video frame: {}", e);
            }
        }
        true
    }
}

/// Video statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStats {
    pub frames_sent: u64,
    pub frames_failed: u64,
}
