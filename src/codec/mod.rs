//! Wire codecs
//!
//! PCM16 audio blocks and JPEG video frames, both carried as base64
//! inside JSON text frames.

pub mod decoder;
pub mod encoder;
pub mod jpeg;

pub use decoder::PcmDecoder;
pub use encoder::PcmEncoder;
pub use jpeg::JpegEncoder;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

/// Encode raw bytes for transport
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a transport payload into raw bytes
pub fn from_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(payload.trim())?)
}
