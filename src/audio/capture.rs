//! Audio capture pipeline
//!
//! The microphone delivers fixed-size blocks of mono f32 samples at the
//! capture rate. Each block taken while recording is encoded to PCM16,
//! base64-wrapped and sent as an `audio` message, but only while the
//! session is open; anything else is dropped on the spot.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::input_device;
use crate::codec::PcmEncoder;
use crate::config::AudioConfig;
use crate::error::{AudioError, Result};
use crate::events::LiveEvent;
use crate::network::SessionManager;
use crate::protocol::OutboundMessage;

/// Called with every complete capture block
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send>;

/// A running microphone stream
pub trait InputStreamHandle: Send {
    /// Stop the stream and release the device. Idempotent.
    fn stop(&mut self);
}

/// Microphone input source
pub trait Microphone: Send + Sync {
    /// Acquire the device and start delivering `config.block_size`-sample
    /// mono blocks at `config.capture_sample_rate`
    fn open(&self, config: &AudioConfig, on_block: BlockCallback) -> std::result::Result<Box<dyn InputStreamHandle>, AudioError>;
}

/// Captures from microphone and streams to the session
pub struct AudioCapture {
    session: SessionManager,
    microphone: Arc<dyn Microphone>,
    config: AudioConfig,
    recording: Arc<AtomicBool>,
    stream: Mutex<Option<Box<dyn InputStreamHandle>>>,
    counters: Arc<CaptureCounters>,
}

#[derive(Default)]
struct CaptureCounters {
    blocks_sent: AtomicU64,
    blocks_dropped: AtomicU64,
}

impl AudioCapture {
    pub fn new(session: SessionManager, microphone: Arc<dyn Microphone>, config: AudioConfig) -> Self {
        Self {
            session,
            microphone,
            config,
            recording: Arc::new(AtomicBool::new(false)),
            stream: Mutex::new(None),
            counters: Arc::new(CaptureCounters::default()),
        }
    }

    /// Acquire the microphone if needed, connect if needed, then record
    pub async fn start_recording(&self) -> Result<()> {
        if let Err(e) = self.ensure_stream() {
            tracing::error!("Failed to initialise microphone: {}", e);
            self.session.events().emit(LiveEvent::LocalError(e.to_string()));
            return Err(e.into());
        }

        if !self.session.is_open() {
            self.session.connect().await?;
        }

        self.recording.store(true, Ordering::SeqCst);
        tracing::info!("Recording started");
        Ok(())
    }

    /// Stop recording and tell the endpoint the utterance ended
    pub fn stop_recording(&self) {
        let was_recording = self.recording.swap(false, Ordering::SeqCst);
        if was_recording {
            tracing::info!("Recording stopped");
        }

        if self.session.is_open() {
            if let Err(e) = self.session.send(&OutboundMessage::End) {
                tracing::warn!("Failed to send end of utterance: {}", e);
            }
        }
    }

    /// Stop recording, release the microphone and close the session
    pub fn close(&self) {
        self.stop_recording();
        self.release_stream();
        self.session.close();
    }

    /// Release the microphone only
    pub fn release_stream(&self) {
        if let Some(mut stream) = self.stream.lock().take() {
            stream.stop();
            tracing::debug!("Microphone released");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.stream.lock().is_some()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            blocks_sent: self.counters.blocks_sent.load(Ordering::Relaxed),
            blocks_dropped: self.counters.blocks_dropped.load(Ordering::Relaxed),
        }
    }

    fn ensure_stream(&self) -> std::result::Result<(), AudioError> {
        let mut stream = self.stream.lock();
        if stream.is_some() {
            return Ok(());
        }

        let session = self.session.clone();
        let recording = self.recording.clone();
        let counters = self.counters.clone();
        let mut encoder = PcmEncoder::new(self.config.block_size);

        let on_block: BlockCallback = Box::new(move |block: &[f32]| {
            if !recording.load(Ordering::Relaxed) {
                return;
            }
            if !session.is_open() {
                counters.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let message = OutboundMessage::Audio {
                data: encoder.encode_base64(block),
            };
            match session.send(&message) {
                Ok(()) => {
                    counters.blocks_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Dropped capture block: {}", e);
                }
            }
        });

        *stream = Some(self.microphone.open(&self.config, on_block)?);
        tracing::info!(
            "Microphone initialised ({} Hz, {}-sample blocks)",
            self.config.capture_sample_rate,
            self.config.block_size
        );
        Ok(())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.recording.store(false, Ordering::SeqCst);
        self.release_stream();
    }
}

/// Capture statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub blocks_sent: u64,
    pub blocks_dropped: u64,
}

/// Collects device frames into fixed-size mono blocks at the capture rate
///
/// Takes the first channel of interleaved input and resamples by linear
/// interpolation.
pub struct BlockAccumulator {
    block: Vec<f32>,
    block_size: usize,
    channels: usize,
    /// Input frames advanced per output sample
    step: f64,
    /// Position of the next output sample relative to `previous`
    phase: f64,
    previous: f32,
}

impl BlockAccumulator {
    pub fn new(block_size: usize, channels: u16, input_rate: u32, output_rate: u32) -> Self {
        Self {
            block: Vec::with_capacity(block_size),
            block_size: block_size.max(1),
            channels: channels.max(1) as usize,
            step: input_rate.max(1) as f64 / output_rate.max(1) as f64,
            phase: 1.0,
            previous: 0.0,
        }
    }

    /// Feed interleaved input; `emit` receives each completed block
    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(&[f32])) {
        for frame in interleaved.chunks(self.channels) {
            let current = frame[0];
            // emit every output sample falling between previous and current
            while self.phase <= 1.0 {
                let t = self.phase as f32;
                self.block.push(self.previous * (1.0 - t) + current * t);
                self.phase += self.step;
                if self.block.len() == self.block_size {
                    emit(&self.block);
                    self.block.clear();
                }
            }
            self.phase -= 1.0;
            self.previous = current;
        }
    }
}

/// The host microphone through cpal
///
/// The cpal stream lives on a dedicated thread for as long as the handle is
/// held, the same way every capture thread in this crate is run.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone;

impl Microphone for CpalMicrophone {
    fn open(&self, config: &AudioConfig, on_block: BlockCallback) -> std::result::Result<Box<dyn InputStreamHandle>, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), AudioError>>(1);

        let thread_running = running.clone();
        let config = config.clone();
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_input_stream(config, on_block, thread_running, ready_tx))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalInput {
                running,
                thread: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(AudioError::StreamError("capture thread exited".to_string())),
        }
    }
}

struct CpalInput {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InputStreamHandle for CpalInput {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_input_stream(
    config: AudioConfig,
    mut on_block: BlockCallback,
    running: Arc<AtomicBool>,
    ready: Sender<std::result::Result<(), AudioError>>,
) {
    let opened = (|| -> std::result::Result<cpal::Stream, AudioError> {
        let device = input_device(config.input_device.as_deref())?;
        let supported = device.default_input_config()?;
        let stream_config: cpal::StreamConfig = supported.config();

        tracing::debug!(
            "Capturing from '{}' at {} Hz, {} channels",
            device.name,
            stream_config.sample_rate.0,
            stream_config.channels
        );

        let mut accumulator = BlockAccumulator::new(
            config.block_size,
            stream_config.channels,
            stream_config.sample_rate.0,
            config.capture_sample_rate,
        );
        let callback_running = running.clone();

        let stream = device
            .inner()
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if callback_running.load(Ordering::Relaxed) {
                        accumulator.push(data, |block| on_block(block));
                    }
                },
                |err| tracing::error!("Audio input stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        Ok(stream)
    })();

    let stream = match opened {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
    drop(stream);
}
