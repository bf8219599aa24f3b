//! PCM16 chunk decoder
//!
//! Turns received little-endian PCM16 bytes into floating-point samples
//! ready for an output buffer.

use crate::error::CodecError;

/// PCM16 decoder
pub struct PcmDecoder {
    /// Chunks decoded
    chunks_decoded: u64,
    /// Total samples produced
    samples_produced: u64,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self {
            chunks_decoded: 0,
            samples_produced: 0,
        }
    }

    /// Decode PCM16 bytes into samples in [-1.0, 1.0)
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let samples = decode_pcm16(data)?;
        self.chunks_decoded += 1;
        self.samples_produced += samples.len() as u64;
        Ok(samples)
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            chunks_decoded: self.chunks_decoded,
            samples_produced: self.samples_produced,
        }
    }
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode without tracking statistics
pub fn decode_pcm16(data: &[u8]) -> Result<Vec<f32>, CodecError> {
    if data.len() % 2 != 0 {
        return Err(CodecError::OddPcmLength(data.len()));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub chunks_decoded: u64,
    pub samples_produced: u64,
}
