//! PCM16 block encoder
//!
//! Converts captured floating-point blocks into little-endian signed
//! 16-bit PCM, the audio format the endpoint expects.

use bytes::Bytes;

use super::to_base64;

/// Convert one sample in [-1.0, 1.0] to int16.
///
/// Out-of-range input is clamped, never wrapped; NaN maps to silence.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// PCM16 encoder with a reusable output buffer
pub struct PcmEncoder {
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Blocks encoded
    blocks_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(block_size: usize) -> Self {
        Self {
            encode_buffer: Vec::with_capacity(block_size * 2),
            blocks_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a block of samples into PCM16 bytes
    pub fn encode(&mut self, samples: &[f32]) -> Bytes {
        self.fill(samples);
        Bytes::copy_from_slice(&self.encode_buffer)
    }

    /// Encode a block straight to its base64 wire form
    pub fn encode_base64(&mut self, samples: &[f32]) -> String {
        self.fill(samples);
        to_base64(&self.encode_buffer)
    }

    fn fill(&mut self, samples: &[f32]) {
        self.encode_buffer.clear();
        for &sample in samples {
            self.encode_buffer
                .extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }
        self.blocks_encoded += 1;
        self.bytes_produced += self.encode_buffer.len() as u64;
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            blocks_encoded: self.blocks_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub blocks_encoded: u64,
    pub bytes_produced: u64,
}
