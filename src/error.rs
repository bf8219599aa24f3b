//! Error types for the live media client

use std::time::Duration;
use thiserror::Error;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("No async runtime available")]
    RuntimeUnavailable,
}

/// Transport and session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Connection closed abnormally (code {code}): {reason}")]
    ConnectionClosedAbnormally { code: u16, reason: String },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Wire encoding errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("PCM16 payload has odd length: {0} bytes")]
    OddPcmLength(usize),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Video subsystem errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Video device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No active video source")]
    NotActive,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(u32),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("No async runtime available")]
    RuntimeUnavailable,

    #[error("Frame encoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Result type alias for the client
pub type Result<T> = std::result::Result<T, Error>;
