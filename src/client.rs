//! Live client: one session wired to the audio and video pipelines
//!
//! The session feeds a structured event stream. The client keeps one
//! subscription for itself to route received audio into playback and to
//! clear the speaking flag at the end of a turn; applications subscribe
//! for everything else.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::audio::{
    AudioCapture, AudioPlayback, CpalMicrophone, CpalOutputFactory, Microphone, OutputContextPool, OutputFactory,
};
use crate::config::{AppConfig, SessionConfig};
use crate::error::{AudioError, Result, SessionError, VideoError};
use crate::events::{EventStream, LiveEvent};
use crate::network::{Connector, SessionManager, WsConnector};
use crate::protocol::VideoMode;
use crate::video::{SystemVideoDevices, VideoCapture, VideoDevices};

/// Assembles a [`LiveClient`], with real devices unless overridden
pub struct LiveClientBuilder {
    config: AppConfig,
    connector: Option<Arc<dyn Connector>>,
    microphone: Option<Arc<dyn Microphone>>,
    output: Option<Arc<dyn OutputFactory>>,
    pool: Option<Arc<OutputContextPool>>,
    video_devices: Option<Arc<dyn VideoDevices>>,
}

impl LiveClientBuilder {
    /// Audio and video session that is never resumed automatically
    pub fn multimodal(mut self) -> Self {
        self.config.session = SessionConfig::multimodal(self.config.session.url.clone());
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn microphone(mut self, microphone: Arc<dyn Microphone>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn output(mut self, factory: Arc<dyn OutputFactory>) -> Self {
        self.output = Some(factory);
        self
    }

    /// Share one output-context pool between several clients
    pub fn output_pool(mut self, pool: Arc<OutputContextPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn video_devices(mut self, devices: Arc<dyn VideoDevices>) -> Self {
        self.video_devices = Some(devices);
        self
    }

    /// Must be called within a tokio runtime
    pub fn build(self) -> Result<LiveClient> {
        let config = self.config;
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));
        let microphone = self.microphone.unwrap_or_else(|| Arc::new(CpalMicrophone));
        let output = self
            .output
            .unwrap_or_else(|| Arc::new(CpalOutputFactory::new(config.audio.output_device.clone())));
        let pool = self
            .pool
            .unwrap_or_else(|| OutputContextPool::shared(config.audio.output_pool_capacity));
        let video_devices = self.video_devices.unwrap_or_else(|| Arc::new(SystemVideoDevices));

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AudioError::RuntimeUnavailable)?;

        let session = SessionManager::new(config.session.clone(), connector);
        let playback = AudioPlayback::new(&config.audio, output, pool)?;
        let capture = AudioCapture::new(session.clone(), microphone, config.audio.clone());
        let video = VideoCapture::new(session.clone(), video_devices, config.video.clone());

        let router = runtime.spawn(route_events(session.subscribe(), playback.clone()));

        tracing::info!(
            "Live client ready for {} (reconnect {})",
            config.session.url,
            if config.session.reconnect.enabled { "enabled" } else { "disabled" }
        );

        Ok(LiveClient {
            session,
            capture,
            playback,
            video,
            router,
            frame_rate: config.video.frame_rate,
        })
    }
}

async fn route_events(mut events: EventStream, playback: AudioPlayback) {
    while let Some(event) = events.recv().await {
        match event {
            LiveEvent::AudioReceived { data } => {
                if let Err(e) = playback.enqueue_base64(&data) {
                    tracing::warn!("Dropping undecodable audio chunk: {}", e);
                }
            }
            LiveEvent::TurnComplete | LiveEvent::Interrupted(_) => playback.mark_turn_ended(),
            _ => {}
        }
    }
}

/// Bidirectional audio/video client for one endpoint
pub struct LiveClient {
    session: SessionManager,
    capture: AudioCapture,
    playback: AudioPlayback,
    video: VideoCapture,
    router: JoinHandle<()>,
    frame_rate: u32,
}

impl LiveClient {
    pub fn builder(config: AppConfig) -> LiveClientBuilder {
        LiveClientBuilder {
            config,
            connector: None,
            microphone: None,
            output: None,
            pool: None,
            video_devices: None,
        }
    }

    /// Audio-only client on real devices
    pub fn audio_only(url: impl Into<String>) -> Result<Self> {
        let mut config = AppConfig::default();
        config.session = SessionConfig::audio_only(url);
        Self::builder(config).build()
    }

    /// Audio and video client on real devices
    pub fn multimodal(url: impl Into<String>) -> Result<Self> {
        let mut config = AppConfig::default();
        config.session.url = url.into();
        Self::builder(config).multimodal().build()
    }

    pub async fn connect(&self) -> std::result::Result<(), SessionError> {
        self.session.connect().await
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.capture.start_recording().await
    }

    pub fn stop_recording(&self) {
        self.capture.stop_recording();
    }

    /// Cut off the endpoint's audio immediately
    pub fn interrupt(&self) {
        self.playback.interrupt();
    }

    pub fn start_webcam(&self) -> std::result::Result<(), VideoError> {
        self.video.start_webcam()
    }

    pub fn start_screen_share(&self) -> std::result::Result<(), VideoError> {
        self.video.start_screen_share()
    }

    /// Stream the active source at the configured frame rate
    pub fn start_video_stream(&self) -> std::result::Result<(), VideoError> {
        self.video.start_video_stream(self.frame_rate)
    }

    pub fn start_video_stream_at(&self, frame_rate: u32) -> std::result::Result<(), VideoError> {
        self.video.start_video_stream(frame_rate)
    }

    pub fn stop_video_stream(&self) {
        self.video.stop_video_stream();
    }

    pub fn stop_video(&self) {
        self.video.stop_video();
    }

    pub fn video_mode(&self) -> Option<VideoMode> {
        self.video.video_mode()
    }

    pub fn is_video_active(&self) -> bool {
        self.video.is_video_active()
    }

    /// Register an observer for every client event
    pub fn subscribe(&self) -> EventStream {
        self.session.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_open()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn is_speaking(&self) -> bool {
        self.playback.is_speaking()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.session_id()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn capture(&self) -> &AudioCapture {
        &self.capture
    }

    pub fn playback(&self) -> &AudioPlayback {
        &self.playback
    }

    pub fn video(&self) -> &VideoCapture {
        &self.video
    }

    /// Release video, playback, microphone and the session. Idempotent.
    pub fn close(&self) {
        self.video.close();
        self.playback.close();
        self.capture.close();
        tracing::info!("Live client closed");
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.router.abort();
        self.video.close();
        self.playback.close();
        self.capture.release_stream();
        self.session.close();
    }
}
