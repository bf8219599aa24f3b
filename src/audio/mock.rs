//! In-memory device doubles for audio tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::capture::{BlockCallback, InputStreamHandle, Microphone};
use crate::audio::output::{AudioBuffer, OnEnded, OutputContext, OutputFactory, PlayingSource};
use crate::config::AudioConfig;
use crate::error::AudioError;

struct MockPlay {
    buffer: AudioBuffer,
    on_ended: Option<OnEnded>,
    stopped: Arc<AtomicBool>,
    finished: bool,
}

/// Output context whose chunks finish only when the test says so
#[derive(Default)]
pub struct MockContext {
    closed: AtomicBool,
    fail_plays: AtomicUsize,
    plays: Mutex<Vec<MockPlay>>,
}

impl MockContext {
    /// First PCM16 sample of every successfully started chunk, in start order
    pub fn markers(&self) -> Vec<i16> {
        self.plays
            .lock()
            .iter()
            .map(|play| {
                play.buffer
                    .samples
                    .first()
                    .map_or(0, |s| (s * 32768.0).round() as i16)
            })
            .collect()
    }

    pub fn last_buffer(&self) -> Option<AudioBuffer> {
        self.plays.lock().last().map(|play| play.buffer.clone())
    }

    /// Chunks started and neither finished nor stopped
    pub fn active_count(&self) -> usize {
        self.plays
            .lock()
            .iter()
            .filter(|play| !play.finished && !play.stopped.load(Ordering::SeqCst))
            .count()
    }

    pub fn was_stopped(&self, index: usize) -> bool {
        self.plays
            .lock()
            .get(index)
            .is_some_and(|play| play.stopped.load(Ordering::SeqCst))
    }

    /// Complete the chunk started `index`-th, even if it was stopped
    pub fn finish(&self, index: usize) {
        let callback = {
            let mut plays = self.plays.lock();
            plays.get_mut(index).and_then(|play| {
                play.finished = true;
                play.on_ended.take()
            })
        };
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    /// Complete whichever chunk is currently playing
    pub fn finish_active(&self) {
        let index = self
            .plays
            .lock()
            .iter()
            .position(|play| !play.finished && !play.stopped.load(Ordering::SeqCst));
        if let Some(index) = index {
            self.finish(index);
        }
    }
}

impl OutputContext for MockContext {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn play(&self, buffer: AudioBuffer, on_ended: OnEnded) -> Result<Box<dyn PlayingSource>, AudioError> {
        if self.is_closed() {
            return Err(AudioError::PlaybackFailed("context closed".into()));
        }
        let failing = self
            .fail_plays
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AudioError::PlaybackFailed("injected failure".into()));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        self.plays.lock().push(MockPlay {
            buffer,
            on_ended: Some(on_ended),
            stopped: stopped.clone(),
            finished: false,
        });
        Ok(Box::new(MockSource { stopped }))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cut_off: Vec<OnEnded> = self
            .plays
            .lock()
            .iter_mut()
            .filter(|play| !play.finished && !play.stopped.load(Ordering::SeqCst))
            .filter_map(|play| {
                play.finished = true;
                play.on_ended.take()
            })
            .collect();
        for callback in cut_off {
            callback(Err(AudioError::PlaybackFailed("context closed".into())));
        }
    }
}

struct MockSource {
    stopped: Arc<AtomicBool>,
}

impl PlayingSource for MockSource {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Factory recording every context it creates
#[derive(Default)]
pub struct MockOutputFactory {
    contexts: Mutex<Vec<Arc<MockContext>>>,
    fail_plays: AtomicUsize,
}

impl MockOutputFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` plays fail, on whichever context runs them
    pub fn fail_next_plays(&self, count: usize) {
        self.fail_plays.store(count, Ordering::SeqCst);
        if let Some(context) = self.latest() {
            context.fail_plays.store(count, Ordering::SeqCst);
        }
    }

    pub fn latest(&self) -> Option<Arc<MockContext>> {
        self.contexts.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.contexts.lock().len()
    }
}

impl OutputFactory for MockOutputFactory {
    fn create(&self, _sample_rate: u32) -> Result<Arc<dyn OutputContext>, AudioError> {
        let context = Arc::new(MockContext::default());
        context
            .fail_plays
            .store(self.fail_plays.swap(0, Ordering::SeqCst), Ordering::SeqCst);
        self.contexts.lock().push(context.clone());
        Ok(context)
    }
}

/// Microphone driven by the test through [`MockMicrophone::feed`]
#[derive(Default)]
pub struct MockMicrophone {
    callback: Arc<Mutex<Option<BlockCallback>>>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    stopped: Arc<AtomicBool>,
}

impl MockMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Microphone that refuses to open, as if permission were denied
    pub fn unavailable() -> Arc<Self> {
        let microphone = Self::default();
        microphone.unavailable.store(true, Ordering::SeqCst);
        Arc::new(microphone)
    }

    /// Deliver one block as the device callback would
    pub fn feed(&self, block: &[f32]) {
        if let Some(callback) = self.callback.lock().as_mut() {
            callback(block);
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Microphone for MockMicrophone {
    fn open(&self, _config: &AudioConfig, on_block: BlockCallback) -> Result<Box<dyn InputStreamHandle>, AudioError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("permission denied".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        *self.callback.lock() = Some(on_block);
        Ok(Box::new(MockInput {
            callback: self.callback.clone(),
            stopped: self.stopped.clone(),
        }))
    }
}

struct MockInput {
    callback: Arc<Mutex<Option<BlockCallback>>>,
    stopped: Arc<AtomicBool>,
}

impl InputStreamHandle for MockInput {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.callback.lock().take();
    }
}
