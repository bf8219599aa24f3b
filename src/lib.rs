//! # Live Media Client
//!
//! Bidirectional low-latency audio/video streaming client for live AI endpoints.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                                LIVE CLIENT                                   │
//! │  ┌─────────────┐        ┌─────────────┐        ┌─────────────────────┐      │
//! │  │ Microphone  │        │Webcam/Screen│        │   Audio Output      │      │
//! │  │  (16 kHz)   │        │   Source    │        │ Context (24 kHz)    │      │
//! │  └──────┬──────┘        └──────┬──────┘        └──────────▲──────────┘      │
//! │         │ 4096-sample blocks   │ still frames             │ one chunk       │
//! │         ▼                      ▼                          │ at a time       │
//! │  ┌─────────────┐        ┌─────────────┐        ┌──────────┴──────────┐      │
//! │  │AudioCapture │        │VideoCapture │        │   AudioPlayback     │      │
//! │  │ f32 → PCM16 │        │ RGBA → JPEG │        │ FIFO PlaybackQueue  │      │
//! │  │  → base64   │        │  → base64   │        │  PCM16 → f32        │      │
//! │  └──────┬──────┘        └──────┬──────┘        └──────────▲──────────┘      │
//! │         │ send if Open         │ send if Open             │ audio events    │
//! │         ▼                      ▼                          │                 │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │              SessionManager (network::session)                       │   │
//! │  │   Disconnected → Connecting → Open → Closing → Disconnected          │   │
//! │  │   5 s ready timeout, capped exponential reconnect backoff            │   │
//! │  └──────────────────────────────┬──────────────────────────────────────┘   │
//! │                                 │ EventBus: ready/text/turn_complete/...    │
//! └─────────────────────────────────┼───────────────────────────────────────────┘
//!                                   │ JSON text frames over WebSocket
//!                                   ▼
//!                          Remote streaming endpoint
//! ```

pub mod audio;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod protocol;
pub mod video;

pub use client::LiveClient;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of captured microphone audio
    pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate of audio received from the endpoint
    pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

    /// Samples per capture block
    pub const CAPTURE_BLOCK_SIZE: usize = 4096;

    /// Default endpoint URL
    pub const DEFAULT_URL: &str = "ws://localhost:8765";

    /// Time allowed for the endpoint to send `ready`
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Default maximum automatic reconnection attempts
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

    /// Backoff base; attempt `n` waits `base * 2^n`
    pub const BASE_RECONNECT_DELAY_MS: u64 = 1000;

    /// Upper bound for any reconnection delay
    pub const MAX_RECONNECT_DELAY_MS: u64 = 10_000;

    /// Delay before skipping to the next chunk after a playback failure
    pub const PLAYBACK_RETRY_DELAY_MS: u64 = 100;

    /// Maximum number of tracked audio output contexts
    pub const OUTPUT_POOL_CAPACITY: usize = 5;

    /// JPEG quality for video frames (0-100)
    pub const JPEG_QUALITY: u8 = 70;

    /// Frame size used when the visual source cannot report one
    pub const FALLBACK_FRAME_WIDTH: u32 = 640;
    pub const FALLBACK_FRAME_HEIGHT: u32 = 480;

    /// Default video frames per second
    pub const DEFAULT_FRAME_RATE: u32 = 1;
}
