//! Audio playback pipeline
//!
//! Received chunks are decoded and played back-to-back in arrival order,
//! one at a time. Completion of one chunk starts the next; a chunk that
//! fails to play is skipped after a short delay so the queue keeps moving.
//!
//! Every started chunk gets a sequence id and every interrupt bumps an
//! epoch, so completions or retries belonging to a superseded chunk are
//! recognised and ignored.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

use crate::audio::buffer::{PlaybackQueue, QueueStats};
use crate::audio::output::{AudioBuffer, OutputContext, OutputContextPool, OutputFactory, PlayingSource};
use crate::codec::{from_base64, PcmDecoder};
use crate::config::AudioConfig;
use crate::error::{AudioError, CodecError};

struct PlaybackState {
    queue: PlaybackQueue,
    playing: bool,
    speaking: bool,
    epoch: u64,
    next_play_id: u64,
    active_play_id: Option<u64>,
    current: Option<Box<dyn PlayingSource>>,
    context: Option<Arc<dyn OutputContext>>,
    decoder: PcmDecoder,
}

struct PlaybackInner {
    factory: Arc<dyn OutputFactory>,
    pool: Arc<OutputContextPool>,
    sample_rate: u32,
    retry_delay: Duration,
    runtime: Handle,
    state: Mutex<PlaybackState>,
    chunks_played: AtomicU64,
    chunks_failed: AtomicU64,
}

/// Gapless, ordered, interruptible playback of received audio
#[derive(Clone)]
pub struct AudioPlayback {
    inner: Arc<PlaybackInner>,
}

impl AudioPlayback {
    /// Must be called from within a tokio runtime; failed chunks are
    /// retried on it.
    pub fn new(
        config: &AudioConfig,
        factory: Arc<dyn OutputFactory>,
        pool: Arc<OutputContextPool>,
    ) -> Result<Self, AudioError> {
        let runtime = Handle::try_current().map_err(|_| AudioError::RuntimeUnavailable)?;
        Ok(Self {
            inner: Arc::new(PlaybackInner {
                factory,
                pool,
                sample_rate: config.playback_sample_rate,
                retry_delay: config.playback_retry_delay(),
                runtime,
                state: Mutex::new(PlaybackState {
                    queue: PlaybackQueue::new(),
                    playing: false,
                    speaking: false,
                    epoch: 0,
                    next_play_id: 0,
                    active_play_id: None,
                    current: None,
                    context: None,
                    decoder: PcmDecoder::new(),
                }),
                chunks_played: AtomicU64::new(0),
                chunks_failed: AtomicU64::new(0),
            }),
        })
    }

    /// Queue a base64 PCM16 payload as received on the wire
    pub fn enqueue_base64(&self, data: &str) -> Result<(), CodecError> {
        let bytes = from_base64(data)?;
        self.enqueue(Bytes::from(bytes));
        Ok(())
    }

    /// Queue raw PCM16 bytes, starting playback if idle
    pub fn enqueue(&self, pcm: Bytes) {
        let start = {
            let mut state = self.inner.state.lock();
            state.queue.push(pcm);
            state.speaking = true;
            if state.playing {
                false
            } else {
                state.playing = true;
                true
            }
        };

        if start {
            self.play_next();
        }
    }

    /// Stop the current chunk and discard everything queued
    pub fn interrupt(&self) {
        let current = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            let discarded = state.queue.clear();
            if discarded > 0 || state.playing {
                tracing::debug!("Playback interrupted, {} queued chunks discarded", discarded);
            }
            state.playing = false;
            state.speaking = false;
            state.active_play_id = None;
            state.current.take()
        };

        if let Some(mut source) = current {
            source.stop();
        }
    }

    /// Clear the speaking flag on `turn_complete` / `interrupted`
    pub fn mark_turn_ended(&self) {
        self.inner.state.lock().speaking = false;
    }

    /// Interrupt and release the output context
    pub fn close(&self) {
        self.interrupt();
        let context = self.inner.state.lock().context.take();
        if let Some(context) = context {
            self.inner.pool.release(&context);
            tracing::debug!("Playback output released");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().playing
    }

    /// Whether the endpoint's turn is still producing audio
    pub fn is_speaking(&self) -> bool {
        self.inner.state.lock().speaking
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn stats(&self) -> PlaybackStats {
        let state = self.inner.state.lock();
        PlaybackStats {
            chunks_played: self.inner.chunks_played.load(Ordering::Relaxed),
            chunks_failed: self.inner.chunks_failed.load(Ordering::Relaxed),
            queue: state.queue.stats(),
        }
    }

    fn play_next(&self) {
        let (chunk, play_id, epoch, samples) = {
            let mut state = self.inner.state.lock();
            let Some(chunk) = state.queue.pop() else {
                state.playing = false;
                state.speaking = false;
                state.active_play_id = None;
                state.current = None;
                tracing::trace!("Playback queue drained");
                return;
            };
            let play_id = state.next_play_id;
            state.next_play_id += 1;
            state.active_play_id = Some(play_id);
            let samples = state.decoder.decode(&chunk.data);
            (chunk, play_id, state.epoch, samples)
        };

        let started = samples
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))
            .and_then(|samples| {
                let context = self.output_context()?;
                let weak = Arc::downgrade(&self.inner);
                let on_ended = Box::new(move |result| chunk_ended(weak, play_id, result));
                context.play(AudioBuffer::new(samples, self.inner.sample_rate), on_ended)
            });

        match started {
            Ok(source) => {
                let mut state = self.inner.state.lock();
                if state.epoch == epoch && state.active_play_id == Some(play_id) {
                    state.current = Some(source);
                } else {
                    // interrupted while starting, or already finished
                    drop(state);
                    let mut source = source;
                    source.stop();
                }
            }
            Err(e) => {
                self.inner.chunks_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Skipping chunk {} after playback failure: {}", chunk.sequence, e);
                self.schedule_retry(epoch);
            }
        }
    }

    fn schedule_retry(&self, epoch: u64) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.retry_delay;
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            let playback = AudioPlayback { inner };
            let current = {
                let state = playback.inner.state.lock();
                state.epoch == epoch && state.playing
            };
            if current {
                playback.play_next();
            }
        });
    }

    fn output_context(&self) -> Result<Arc<dyn OutputContext>, AudioError> {
        if let Some(context) = self.inner.state.lock().context.as_ref() {
            if !context.is_closed() {
                return Ok(context.clone());
            }
        }

        let context = self.inner.factory.create(self.inner.sample_rate)?;
        self.inner.pool.register(context.clone());
        self.inner.state.lock().context = Some(context.clone());
        tracing::debug!("Created audio output context");
        Ok(context)
    }
}

fn chunk_ended(inner: Weak<PlaybackInner>, play_id: u64, result: Result<(), AudioError>) {
    let Some(inner) = inner.upgrade() else { return };
    let playback = AudioPlayback { inner };
    let epoch = {
        let mut state = playback.inner.state.lock();
        if !state.playing || state.active_play_id != Some(play_id) {
            return;
        }
        state.current = None;
        state.epoch
    };

    match result {
        Ok(()) => {
            playback.inner.chunks_played.fetch_add(1, Ordering::Relaxed);
            playback.play_next();
        }
        Err(e) => {
            // context closed under the chunk, e.g. evicted from a shared pool
            playback.inner.chunks_failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Chunk cut off during playback: {}", e);
            playback.schedule_retry(epoch);
        }
    }
}

/// Playback statistics
#[derive(Debug, Clone)]
pub struct PlaybackStats {
    pub chunks_played: u64,
    pub chunks_failed: u64,
    pub queue: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::MockOutputFactory;
    use proptest::prelude::*;

    fn chunk(marker: i16) -> Bytes {
        let mut bytes = Vec::new();
        for _ in 0..240 {
            bytes.extend_from_slice(&marker.to_le_bytes());
        }
        Bytes::from(bytes)
    }

    fn playback(factory: &Arc<MockOutputFactory>) -> AudioPlayback {
        AudioPlayback::new(&AudioConfig::default(), factory.clone(), OutputContextPool::shared(5)).unwrap()
    }

    #[tokio::test]
    async fn test_plays_in_arrival_order_one_at_a_time() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);

        playback.enqueue(chunk(1));
        playback.enqueue(chunk(2));
        playback.enqueue(chunk(3));
        assert!(playback.is_playing());
        assert!(playback.is_speaking());

        let context = factory.latest().unwrap();
        assert_eq!(context.markers(), vec![1], "only one chunk drives output");
        assert_eq!(playback.queue_len(), 2);

        context.finish_active();
        assert_eq!(context.markers(), vec![1, 2]);
        context.finish_active();
        context.finish_active();
        assert_eq!(context.markers(), vec![1, 2, 3]);

        assert!(!playback.is_playing());
        assert!(!playback.is_speaking());
        assert_eq!(playback.stats().chunks_played, 3);
        assert_eq!(factory.created(), 1, "context reused across chunks");
    }

    #[tokio::test]
    async fn test_playback_buffer_format() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);

        playback.enqueue_base64("AEAAwA==").unwrap();
        let context = factory.latest().unwrap();
        let buffer = context.last_buffer().unwrap();
        assert_eq!(buffer.sample_rate, 24_000);
        assert_eq!(buffer.samples, vec![0.5, -0.5]);

        assert!(playback.enqueue_base64("not base64!").is_err());
    }

    #[tokio::test]
    async fn test_interrupt_stops_and_discards() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);

        playback.enqueue(chunk(1));
        playback.enqueue(chunk(2));
        playback.enqueue(chunk(3));
        let context = factory.latest().unwrap();

        playback.interrupt();
        assert_eq!(playback.queue_len(), 0);
        assert!(!playback.is_playing());
        assert!(!playback.is_speaking());
        assert!(context.was_stopped(0));
        assert_eq!(playback.stats().queue.discarded, 2);

        // a late completion from the stopped chunk starts nothing
        context.finish(0);
        assert_eq!(context.markers(), vec![1]);

        playback.enqueue(chunk(4));
        assert_eq!(context.markers(), vec![1, 4]);
    }

    #[tokio::test]
    async fn test_interrupt_when_idle_is_safe() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);
        playback.interrupt();
        playback.interrupt();
        assert!(!playback.is_playing());
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_skipped_after_delay() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);
        factory.fail_next_plays(1);

        playback.enqueue(chunk(1));
        playback.enqueue(chunk(2));
        let context = factory.latest().unwrap();
        assert_eq!(context.markers(), Vec::<i16>::new());
        assert!(playback.is_playing(), "pipeline keeps running through a failure");

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(context.markers(), Vec::<i16>::new());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(context.markers(), vec![2]);
        assert_eq!(playback.stats().chunks_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_pending_retry() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);
        factory.fail_next_plays(1);

        playback.enqueue(chunk(1));
        playback.enqueue(chunk(2));
        playback.interrupt();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let context = factory.latest().unwrap();
        assert_eq!(context.markers(), Vec::<i16>::new());
        assert!(!playback.is_playing());
    }

    #[tokio::test]
    async fn test_turn_end_clears_speaking_only() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);

        playback.enqueue(chunk(1));
        playback.mark_turn_ended();
        assert!(!playback.is_speaking());
        assert!(playback.is_playing());
    }

    #[tokio::test]
    async fn test_closed_context_replaced() {
        let factory = MockOutputFactory::new();
        let playback = playback(&factory);

        playback.enqueue(chunk(1));
        let first = factory.latest().unwrap();
        first.finish_active();
        first.close();

        playback.enqueue(chunk(2));
        let second = factory.latest().unwrap();
        assert_eq!(factory.created(), 2);
        assert_eq!(second.markers(), vec![2]);

        playback.close();
        assert!(second.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_pool_eviction_does_not_stall_playback() {
        let pool = OutputContextPool::shared(5);
        let factory = MockOutputFactory::new();
        let others_factory = MockOutputFactory::new();
        let config = AudioConfig::default();
        let playback = AudioPlayback::new(&config, factory.clone(), pool.clone()).unwrap();

        playback.enqueue(chunk(1));
        playback.enqueue(chunk(2));
        let first = factory.latest().unwrap();

        // five more pipelines on the same pool push the first context out
        let others: Vec<AudioPlayback> = (0..5)
            .map(|i| {
                let other = AudioPlayback::new(&config, others_factory.clone(), pool.clone()).unwrap();
                other.enqueue(chunk(100 + i));
                other
            })
            .collect();
        assert!(first.is_closed());
        assert_eq!(first.markers(), vec![1]);
        assert!(playback.is_playing());

        playback.enqueue(chunk(3));
        tokio::time::sleep(Duration::from_millis(101)).await;

        assert_eq!(factory.created(), 2, "fresh context after eviction");
        let second = factory.latest().unwrap();
        assert_eq!(second.markers(), vec![2]);

        second.finish_active();
        second.finish_active();
        assert_eq!(second.markers(), vec![2, 3]);
        assert!(!playback.is_playing());
        assert_eq!(playback.queue_len(), 0);

        let stats = playback.stats();
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.chunks_played, 2);
        drop(others);
    }

    #[test]
    fn test_requires_runtime() {
        let factory = MockOutputFactory::new();
        let result = AudioPlayback::new(&AudioConfig::default(), factory, OutputContextPool::shared(5));
        assert!(matches!(result, Err(AudioError::RuntimeUnavailable)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue,
        Finish,
        Interrupt,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Enqueue),
            2 => Just(Op::Finish),
            1 => Just(Op::Interrupt),
        ]
    }

    proptest! {
        #[test]
        fn prop_order_and_interrupt(ops in proptest::collection::vec(op(), 1..60)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let _guard = runtime.enter();
            let factory = MockOutputFactory::new();
            let playback = playback(&factory);

            let mut next_marker = 0i16;
            for op in ops {
                match op {
                    Op::Enqueue => {
                        playback.enqueue(chunk(next_marker));
                        next_marker += 1;
                    }
                    Op::Finish => {
                        if let Some(context) = factory.latest() {
                            context.finish_active();
                        }
                    }
                    Op::Interrupt => {
                        playback.interrupt();
                        prop_assert_eq!(playback.queue_len(), 0);
                        prop_assert!(!playback.is_playing());
                        prop_assert!(!playback.is_speaking());
                    }
                }
                if let Some(context) = factory.latest() {
                    prop_assert!(context.active_count() <= 1, "two chunks playing at once");
                }
            }

            let started: Vec<i16> = factory.latest().map(|c| c.markers()).unwrap_or_default();
            prop_assert!(started.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", started);
        }
    }
}
