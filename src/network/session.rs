//! Transport & session manager
//!
//! Owns the single connection to the streaming endpoint:
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──ready──▶ Open
//!       ▲                          │                   │
//!       │◀── error / timeout ──────┘                   │
//!       │◀── remote close ─────────────────────────────┤
//!       └──────────── Closing ◀──── close() ───────────┘
//! ```
//!
//! Failed attempts and abnormal closures schedule a bounded, backed-off
//! reconnection. Every connection handle carries a generation number so
//! late events from a torn-down handle are discarded.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{EventBus, EventStream, LiveEvent};
use crate::network::reconnect::ReconnectPolicy;
use crate::network::transport::{Connector, SocketEvent, SocketPair, SocketSink, WsConnector};
use crate::protocol::{is_normal_closure, InboundMessage, OutboundMessage, CLOSE_ABNORMAL};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Outcome of one connection attempt, shared by all waiters
#[derive(Debug, Clone)]
enum AttemptStatus {
    Pending,
    Ready,
    Failed(SessionError),
}

enum WriterCommand {
    Text(String),
    Close,
}

/// One live socket plus the task that reads from it
struct ConnectionHandle {
    generation: u64,
    /// Present once the socket has opened
    outbound: Option<mpsc::UnboundedSender<WriterCommand>>,
    driver: JoinHandle<()>,
}

struct SessionState {
    status: ConnectionState,
    generation: u64,
    handle: Option<ConnectionHandle>,
    attempt: Option<watch::Sender<AttemptStatus>>,
    session_id: Option<String>,
    reconnect_attempts: u32,
    reconnect_task: Option<JoinHandle<()>>,
}

struct SessionInner {
    config: SessionConfig,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    state: Mutex<SessionState>,
    events: EventBus,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

/// Cloneable handle to one logical session
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let policy = ReconnectPolicy::from_config(&config.reconnect);
        Self {
            inner: Arc::new(SessionInner {
                config,
                policy,
                connector,
                state: Mutex::new(SessionState {
                    status: ConnectionState::Disconnected,
                    generation: 0,
                    handle: None,
                    attempt: None,
                    session_id: None,
                    reconnect_attempts: 0,
                    reconnect_task: None,
                }),
                events: EventBus::new(),
                messages_sent: AtomicU64::new(0),
                messages_received: AtomicU64::new(0),
            }),
        }
    }

    /// Session over a real WebSocket
    pub fn websocket(config: SessionConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    /// Connect and wait for the endpoint's `ready`.
    ///
    /// Concurrent callers share the in-flight attempt instead of opening a
    /// second socket; all of them observe the same outcome.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut outcome = {
            let mut state = self.inner.state.lock();
            match state.status {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => match &state.attempt {
                    Some(attempt) => {
                        tracing::debug!("Connection attempt already in flight, waiting on it");
                        attempt.subscribe()
                    }
                    None => self.begin_attempt(&mut state),
                },
                ConnectionState::Disconnected | ConnectionState::Closing => {
                    self.begin_attempt(&mut state)
                }
            }
        };

        let status = match outcome.wait_for(|s| !matches!(s, AttemptStatus::Pending)).await {
            Ok(status) => status.clone(),
            Err(_) => AttemptStatus::Failed(SessionError::Closed),
        };

        match status {
            AttemptStatus::Ready => Ok(()),
            AttemptStatus::Failed(e) => Err(e),
            AttemptStatus::Pending => Err(SessionError::Closed),
        }
    }

    /// Release the connection and cancel any pending reconnection. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();

        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }
        state.reconnect_attempts = 0;
        state.session_id = None;

        if state.status == ConnectionState::Disconnected && state.handle.is_none() {
            return;
        }

        self.set_status(&mut state, ConnectionState::Closing);
        if let Some(attempt) = state.attempt.take() {
            let _ = attempt.send(AttemptStatus::Failed(SessionError::Closed));
        }
        Self::teardown_handle(&mut state);
        self.set_status(&mut state, ConnectionState::Disconnected);

        tracing::info!("Session closed");
    }

    /// Queue a message for the endpoint. Only valid while `Open`.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        let json = message
            .to_json()
            .map_err(|e| SessionError::SendFailed(e.to_string()))?;

        let state = self.inner.state.lock();
        if state.status != ConnectionState::Open {
            return Err(SessionError::NotConnected);
        }
        let outbound = state
            .handle
            .as_ref()
            .and_then(|handle| handle.outbound.as_ref())
            .ok_or(SessionError::NotConnected)?;

        outbound
            .send(WriterCommand::Text(json))
            .map_err(|_| SessionError::SendFailed("socket writer stopped".to_string()))?;

        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Queued {} message", message.kind());
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().status
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Identifier assigned by the endpoint, if any
    pub fn session_id(&self) -> Option<String> {
        self.inner.state.lock().session_id.clone()
    }

    /// Automatic reconnection attempts since the session was last open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect_attempts
    }

    /// Register an observer for session events
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// The bus shared with pipelines that raise their own events
    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts(),
        }
    }

    fn begin_attempt(&self, state: &mut SessionState) -> watch::Receiver<AttemptStatus> {
        Self::teardown_handle(state);

        state.generation += 1;
        let generation = state.generation;
        let (attempt, outcome) = watch::channel(AttemptStatus::Pending);
        state.attempt = Some(attempt);
        self.set_status(state, ConnectionState::Connecting);

        tracing::info!("Connecting to {} (generation {})", self.inner.config.url, generation);

        let driver = tokio::spawn(self.clone().drive(generation));
        state.handle = Some(ConnectionHandle {
            generation,
            outbound: None,
            driver,
        });
        outcome
    }

    fn teardown_handle(state: &mut SessionState) {
        if let Some(handle) = state.handle.take() {
            if let Some(outbound) = handle.outbound {
                let _ = outbound.send(WriterCommand::Close);
            }
            handle.driver.abort();
        }
    }

    fn set_status(&self, state: &mut SessionState, status: ConnectionState) {
        if state.status != status {
            tracing::debug!("Session state {:?} -> {:?}", state.status, status);
            state.status = status;
            self.inner.events.emit(LiveEvent::StateChanged(status));
        }
    }

    fn is_current(state: &SessionState, generation: u64) -> bool {
        state
            .handle
            .as_ref()
            .is_some_and(|handle| handle.generation == generation)
    }

    /// Reads one connection until it ends
    async fn drive(self, generation: u64) {
        let timeout = self.inner.config.connect_timeout();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let opened = tokio::select! {
            result = self.inner.connector.connect(&self.inner.config.url) => result,
            _ = &mut deadline => Err(SessionError::ConnectionTimeout(timeout)),
        };
        let SocketPair { sink, mut stream } = match opened {
            Ok(pair) => pair,
            Err(e) => {
                self.attempt_failed(generation, e);
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let attached = {
            let mut state = self.inner.state.lock();
            match state.handle.as_mut() {
                Some(handle) if handle.generation == generation => {
                    handle.outbound = Some(outbound_tx);
                    true
                }
                _ => false,
            }
        };
        if !attached {
            tracing::debug!("Connection {} superseded before it opened", generation);
            let mut sink = sink;
            sink.close().await;
            return;
        }
        tokio::spawn(run_writer(sink, outbound_rx));

        let mut awaiting_ready = true;
        loop {
            let event = if awaiting_ready {
                tokio::select! {
                    event = stream.next_event() => event,
                    _ = &mut deadline => {
                        tracing::error!("No ready signal within {:?}", timeout);
                        self.attempt_failed(generation, SessionError::ConnectionTimeout(timeout));
                        return;
                    }
                }
            } else {
                stream.next_event().await
            };

            match event {
                Some(SocketEvent::Text(text)) => {
                    if self.dispatch(generation, &text) {
                        awaiting_ready = false;
                    }
                }
                Some(SocketEvent::Error(e)) => {
                    tracing::error!("Socket error: {}", e);
                    self.inner.events.emit(LiveEvent::LocalError(e.clone()));
                    self.connection_lost(generation, CLOSE_ABNORMAL, e);
                    return;
                }
                Some(SocketEvent::Closed { code, reason }) => {
                    self.connection_lost(generation, code, reason);
                    return;
                }
                None => {
                    self.connection_lost(generation, CLOSE_ABNORMAL, "stream ended".to_string());
                    return;
                }
            }
        }
    }

    /// Route one inbound frame. Returns true when it was the `ready` signal.
    fn dispatch(&self, generation: u64, text: &str) -> bool {
        if !Self::is_current(&self.inner.state.lock(), generation) {
            return false;
        }
        self.inner.messages_received.fetch_add(1, Ordering::Relaxed);

        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping inbound message: {}", e);
                return false;
            }
        };

        let events = &self.inner.events;
        match message {
            InboundMessage::Ready => return self.mark_open(generation),
            InboundMessage::Audio { data } => events.emit(LiveEvent::AudioReceived { data }),
            InboundMessage::Text { data } => events.emit(LiveEvent::Text(data)),
            InboundMessage::TurnComplete => events.emit(LiveEvent::TurnComplete),
            InboundMessage::Interrupted { data } => events.emit(LiveEvent::Interrupted(data)),
            InboundMessage::Error { data } => {
                tracing::warn!("Endpoint reported error: {:?}", data);
                events.emit(LiveEvent::RemoteError(data));
            }
            InboundMessage::SessionId { data } => {
                tracing::info!("Session id assigned: {}", data);
                self.inner.state.lock().session_id = Some(data.clone());
                events.emit(LiveEvent::SessionId(data));
            }
            InboundMessage::Unknown => tracing::debug!("Ignoring message of unknown type"),
        }
        false
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock();
        if !Self::is_current(&state, generation) {
            return false;
        }
        if state.status == ConnectionState::Open {
            tracing::debug!("Duplicate ready signal ignored");
            return true;
        }

        state.reconnect_attempts = 0;
        self.set_status(&mut state, ConnectionState::Open);
        if let Some(attempt) = state.attempt.take() {
            let _ = attempt.send(AttemptStatus::Ready);
        }
        self.inner.events.emit(LiveEvent::Ready);
        tracing::info!("Session open");
        true
    }

    fn attempt_failed(&self, generation: u64, error: SessionError) {
        let mut state = self.inner.state.lock();
        if !Self::is_current(&state, generation) {
            return;
        }

        tracing::error!("Connection attempt failed: {}", error);
        if let SessionError::ConnectionError(reason) = &error {
            self.inner.events.emit(LiveEvent::LocalError(reason.clone()));
        }
        if let Some(attempt) = state.attempt.take() {
            let _ = attempt.send(AttemptStatus::Failed(error));
        }
        Self::teardown_handle(&mut state);
        self.set_status(&mut state, ConnectionState::Disconnected);
        self.schedule_reconnect(&mut state);
    }

    fn connection_lost(&self, generation: u64, code: u16, reason: String) {
        let mut state = self.inner.state.lock();
        if !Self::is_current(&state, generation) {
            return;
        }

        if let Some(attempt) = state.attempt.take() {
            let error = if is_normal_closure(code) {
                SessionError::ConnectionError(format!("closed during connection attempt (code {})", code))
            } else {
                SessionError::ConnectionClosedAbnormally {
                    code,
                    reason: reason.clone(),
                }
            };
            let _ = attempt.send(AttemptStatus::Failed(error));
        }
        Self::teardown_handle(&mut state);
        self.set_status(&mut state, ConnectionState::Disconnected);

        if is_normal_closure(code) {
            tracing::info!("Connection closed normally (code {})", code);
        } else {
            tracing::warn!("Connection closed abnormally (code {}): {}", code, reason);
            self.schedule_reconnect(&mut state);
        }
    }

    fn schedule_reconnect(&self, state: &mut SessionState) {
        if state.reconnect_task.is_some() {
            tracing::debug!("Reconnection already scheduled");
            return;
        }

        let attempt = state.reconnect_attempts + 1;
        if !self.inner.policy.allows(attempt) {
            if self.inner.policy.is_enabled() {
                tracing::warn!(
                    "Max reconnection attempts reached ({})",
                    self.inner.policy.max_attempts()
                );
            } else {
                tracing::debug!("Automatic reconnection disabled");
            }
            return;
        }

        state.reconnect_attempts = attempt;
        let delay = self.inner.policy.delay_for(attempt);
        tracing::info!("Attempting to reconnect in {:?} (attempt {})", delay, attempt);

        let session = self.clone();
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.inner.state.lock().reconnect_task = None;

            match session.connect().await {
                Ok(()) => tracing::info!("Reconnected successfully"),
                Err(e) => tracing::warn!("Reconnection failed: {}", e),
            }
        }));
    }
}

async fn run_writer(mut sink: Box<dyn SocketSink>, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Text(text) => {
                if let Err(e) = sink.send_text(text).await {
                    tracing::warn!("Socket write failed: {}", e);
                    break;
                }
            }
            WriterCommand::Close => break,
        }
    }
    sink.close().await;
}

/// Session statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_attempts: u32,
}
