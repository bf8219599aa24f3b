//! Structured event stream
//!
//! Every subscriber gets its own unbounded channel, so each observer sees
//! events in exactly the order they were emitted and a slow observer never
//! causes another to miss events.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::network::ConnectionState;

/// Events surfaced to the surrounding application
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Session state transition
    StateChanged(ConnectionState),
    /// Endpoint signalled the session is usable
    Ready,
    /// Base64 PCM16 chunk received (also routed to playback)
    AudioReceived { data: String },
    /// Transcript or text content
    Text(String),
    /// Endpoint finished its turn
    TurnComplete,
    /// Endpoint response was cut off
    Interrupted(Option<Value>),
    /// Endpoint-reported error
    RemoteError(Option<Value>),
    /// Session identifier assigned by the endpoint
    SessionId(String),
    /// Local failure: socket error, device initialisation failure
    LocalError(String),
    /// The user stopped screen sharing from the OS/browser UI
    ScreenShareEnded,
}

/// Receiving half handed to subscribers
pub type EventStream = mpsc::UnboundedReceiver<LiveEvent>;

/// Fan-out of [`LiveEvent`]s to any number of subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<LiveEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, pruning dropped ones
    pub fn emit(&self, event: LiveEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
