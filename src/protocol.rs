//! Wire protocol spoken with the streaming endpoint
//!
//! Every frame is a JSON text message discriminated by a `type` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// Close code for a normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when an endpoint is going away
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when the connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Whether a close code ends the session without reconnection
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}

/// Visual source a video frame was sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    Webcam,
    Screen,
}

impl VideoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoMode::Webcam => "webcam",
            VideoMode::Screen => "screen",
        }
    }
}

impl std::fmt::Display for VideoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client → endpoint messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// One base64 PCM16 capture block
    Audio { data: String },
    /// One base64 JPEG frame
    Video { data: String, mode: VideoMode },
    /// Recording utterance ended
    End,
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Audio { .. } => "audio",
            OutboundMessage::Video { .. } => "video",
            OutboundMessage::End => "end",
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|e| CodecError::MalformedMessage(e.to_string()))
    }
}

/// Endpoint → client messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ready,
    Audio {
        data: String,
    },
    Text {
        data: String,
    },
    TurnComplete,
    Interrupted {
        #[serde(default)]
        data: Option<Value>,
    },
    Error {
        #[serde(default)]
        data: Option<Value>,
    },
    SessionId {
        data: String,
    },
    /// Any `type` this client does not understand
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a JSON text frame
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::MalformedMessage(e.to_string()))
    }
}
