//! Audio output contexts
//!
//! An [`OutputContext`] plays one mono buffer at a time and reports when it
//! finished. Contexts are costly to create, so the playback pipeline reuses
//! one while it stays open and registers every new one in a bounded
//! [`OutputContextPool`] that closes the oldest once the cap is exceeded.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::device::output_device;
use crate::error::AudioError;

/// Mono sample buffer ready for output
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }
}

/// Completion callback for one played buffer. `Err` means the buffer was
/// cut off because its context closed.
pub type OnEnded = Box<dyn FnOnce(Result<(), AudioError>) + Send>;

/// A buffer currently driving an output context
pub trait PlayingSource: Send {
    /// Stop output immediately. The completion callback is not invoked.
    fn stop(&mut self);
}

/// Audio output sink
pub trait OutputContext: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Start playing `buffer`; `on_ended` runs once it has been fully output.
    /// `on_ended` may run before this call returns.
    fn play(&self, buffer: AudioBuffer, on_ended: OnEnded) -> Result<Box<dyn PlayingSource>, AudioError>;

    /// Release the underlying device. Idempotent. A buffer still playing
    /// has its `on_ended` called with an error.
    fn close(&self);
}

/// Creates output contexts
pub trait OutputFactory: Send + Sync {
    fn create(&self, sample_rate: u32) -> Result<Arc<dyn OutputContext>, AudioError>;
}

/// Bounded registry of created output contexts; oldest evicted first
pub struct OutputContextPool {
    capacity: usize,
    contexts: Mutex<VecDeque<Arc<dyn OutputContext>>>,
}

impl OutputContextPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            contexts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Track a newly created context, closing the oldest ones beyond capacity
    pub fn register(&self, context: Arc<dyn OutputContext>) {
        let evicted: Vec<Arc<dyn OutputContext>> = {
            let mut contexts = self.contexts.lock();
            contexts.retain(|c| !c.is_closed());
            contexts.push_back(context);
            let excess = contexts.len().saturating_sub(self.capacity);
            contexts.drain(..excess).collect()
        };

        for context in evicted {
            tracing::debug!("Output context pool full, closing oldest context");
            context.close();
        }
    }

    /// Close a context and stop tracking it
    pub fn release(&self, context: &Arc<dyn OutputContext>) {
        let target = Arc::as_ptr(context) as *const ();
        self.contexts
            .lock()
            .retain(|c| Arc::as_ptr(c) as *const () != target);
        context.close();
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Output contexts on a cpal device
#[derive(Debug, Clone, Default)]
pub struct CpalOutputFactory {
    device_id: Option<String>,
}

impl CpalOutputFactory {
    pub fn new(device_id: Option<String>) -> Self {
        Self { device_id }
    }
}

impl OutputFactory for CpalOutputFactory {
    fn create(&self, _sample_rate: u32) -> Result<Arc<dyn OutputContext>, AudioError> {
        let context = CpalOutputContext::open(self.device_id.clone())?;
        Ok(Arc::new(context))
    }
}

struct Voice {
    id: u64,
    samples: Vec<f32>,
    position: f64,
    /// Source samples advanced per device frame
    step: f64,
}

struct OutputShared {
    voice: Mutex<Option<Voice>>,
    running: AtomicBool,
}

type CallbackMap = Arc<Mutex<HashMap<u64, OnEnded>>>;

/// Output context owning a cpal stream on a dedicated thread
///
/// The stream thread renders the current voice and reports finished voice
/// ids over a channel; a notifier thread turns those into callbacks so
/// user code never runs on the real-time audio thread.
pub struct CpalOutputContext {
    shared: Arc<OutputShared>,
    callbacks: CallbackMap,
    device_rate: u32,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl CpalOutputContext {
    pub fn open(device_id: Option<String>) -> Result<Self, AudioError> {
        let shared = Arc::new(OutputShared {
            voice: Mutex::new(None),
            running: AtomicBool::new(true),
        });
        let callbacks: CallbackMap = Arc::new(Mutex::new(HashMap::new()));
        let (done_tx, done_rx) = unbounded::<u64>();
        let (ready_tx, ready_rx) = bounded::<Result<u32, AudioError>>(1);

        let stream_shared = shared.clone();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_stream(device_id, stream_shared, done_tx, ready_tx))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamError("output thread exited".to_string()))??;

        let notifier_shared = shared.clone();
        let notifier_callbacks = callbacks.clone();
        thread::Builder::new()
            .name("audio-output-events".to_string())
            .spawn(move || run_notifier(notifier_shared, notifier_callbacks, done_rx))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!("Audio output opened at {} Hz", device_rate);

        Ok(Self {
            shared,
            callbacks,
            device_rate,
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

}

impl OutputContext for CpalOutputContext {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn play(&self, buffer: AudioBuffer, on_ended: OnEnded) -> Result<Box<dyn PlayingSource>, AudioError> {
        if self.is_closed() {
            return Err(AudioError::PlaybackFailed("output context closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, on_ended);
        *self.shared.voice.lock() = Some(Voice {
            id,
            samples: buffer.samples,
            position: 0.0,
            step: buffer.sample_rate as f64 / self.device_rate.max(1) as f64,
        });

        Ok(Box::new(CpalSource {
            id,
            shared: self.shared.clone(),
            callbacks: self.callbacks.clone(),
        }))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        *self.shared.voice.lock() = None;
        let pending: Vec<OnEnded> = self.callbacks.lock().drain().map(|(_, callback)| callback).collect();
        for callback in pending {
            callback(Err(AudioError::PlaybackFailed("output context closed".to_string())));
        }
        tracing::debug!("Audio output context closed");
    }
}

impl Drop for CpalOutputContext {
    fn drop(&mut self) {
        self.close();
    }
}

struct CpalSource {
    id: u64,
    shared: Arc<OutputShared>,
    callbacks: CallbackMap,
}

impl PlayingSource for CpalSource {
    fn stop(&mut self) {
        self.callbacks.lock().remove(&self.id);
        let mut voice = self.shared.voice.lock();
        if voice.as_ref().is_some_and(|v| v.id == self.id) {
            *voice = None;
        }
    }
}

fn run_output_stream(
    device_id: Option<String>,
    shared: Arc<OutputShared>,
    done: Sender<u64>,
    ready: Sender<Result<u32, AudioError>>,
) {
    let stream = match build_output_stream(device_id.as_deref(), shared.clone(), done) {
        Ok((stream, rate)) => {
            if let Err(e) = stream.play() {
                let _ = ready.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }
            let _ = ready.send(Ok(rate));
            stream
        }
        Err(e) => {
            tracing::error!("Failed to open audio output: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    while shared.running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
    drop(stream);
}

fn build_output_stream(
    device_id: Option<&str>,
    shared: Arc<OutputShared>,
    done: Sender<u64>,
) -> Result<(cpal::Stream, u32), AudioError> {
    let device = output_device(device_id)?;
    let supported = device.default_output_config()?;
    let config: cpal::StreamConfig = supported.config();
    let channels = config.channels.max(1) as usize;
    let rate = config.sample_rate.0;

    let stream = device
        .inner()
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(&shared, data, channels, &done),
            |err| tracing::error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok((stream, rate))
}

/// Fill one device buffer from the current voice, upmixing mono to every channel
fn render(shared: &OutputShared, data: &mut [f32], channels: usize, done: &Sender<u64>) {
    let mut voice = shared.voice.lock();
    for frame in data.chunks_mut(channels) {
        let mut sample = 0.0;
        let mut finished = None;
        if let Some(active) = voice.as_mut() {
            if let Some(&value) = active.samples.get(active.position as usize) {
                sample = value;
                active.position += active.step;
            }
            if active.position as usize >= active.samples.len() {
                finished = Some(active.id);
            }
        }
        if let Some(id) = finished {
            *voice = None;
            let _ = done.send(id);
        }
        frame.fill(sample);
    }
}

fn run_notifier(shared: Arc<OutputShared>, callbacks: CallbackMap, done: Receiver<u64>) {
    while shared.running.load(Ordering::Relaxed) {
        match done.recv_timeout(Duration::from_millis(50)) {
            Ok(id) => {
                let callback = callbacks.lock().remove(&id);
                if let Some(callback) = callback {
                    callback(Ok(()));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
