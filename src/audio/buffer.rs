//! Playback queue for received audio
//!
//! Strict FIFO: chunks leave in the order they arrived and each leaves
//! exactly once.

use bytes::Bytes;
use std::collections::VecDeque;

/// One received block of raw PCM16 bytes awaiting output
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    /// Little-endian PCM16 at the playback sample rate
    pub data: Bytes,
    /// Arrival order, starting at 0
    pub sequence: u64,
}

impl PlaybackChunk {
    /// Number of mono samples in the chunk
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Duration in microseconds at `sample_rate`
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        (self.sample_count() as u64 * 1_000_000) / sample_rate.max(1) as u64
    }
}

/// Ordered queue of chunks waiting to be played
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    chunks: VecDeque<PlaybackChunk>,
    next_sequence: u64,
    enqueued: u64,
    dequeued: u64,
    discarded: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; returns its arrival sequence
    pub fn push(&mut self, data: Bytes) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.enqueued += 1;
        self.chunks.push_back(PlaybackChunk { data, sequence });
        sequence
    }

    /// Take the oldest chunk
    pub fn pop(&mut self) -> Option<PlaybackChunk> {
        let chunk = self.chunks.pop_front()?;
        self.dequeued += 1;
        Some(chunk)
    }

    /// Drop everything queued; returns how many chunks were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.chunks.len();
        self.chunks.clear();
        self.discarded += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total queued playback time in microseconds
    pub fn queued_duration_us(&self, sample_rate: u32) -> u64 {
        self.chunks.iter().map(|c| c.duration_us(sample_rate)).sum()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.chunks.len(),
            enqueued: self.enqueued,
            dequeued: self.dequeued,
            discarded: self.discarded,
        }
    }
}

/// Playback queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub discarded: u64,
}
