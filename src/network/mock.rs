//! In-memory socket doubles for session tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::network::session::SessionManager;
use crate::network::transport::{Connector, SocketEvent, SocketPair, SocketSink, SocketStream};

/// What the client wrote to a mock socket
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Close,
}

/// Endpoint side of one accepted mock connection
pub struct MockRemote {
    to_client: mpsc::UnboundedSender<SocketEvent>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MockRemote {
    pub fn ready(&self) {
        self.send_json(r#"{"type":"ready"}"#);
    }

    pub fn send_json(&self, text: &str) {
        let _ = self.to_client.send(SocketEvent::Text(text.to_string()));
    }

    pub fn close(&self, code: u16) {
        let _ = self.to_client.send(SocketEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    pub fn fail(&self, error: &str) {
        let _ = self.to_client.send(SocketEvent::Error(error.to_string()));
    }

    /// Everything written by the client so far
    pub fn drain_frames(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Text frames written so far, parsed as JSON
    pub fn sent_messages(&mut self) -> Vec<serde_json::Value> {
        self.drain_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ClientFrame::Text(text) => serde_json::from_str(&text).ok(),
                ClientFrame::Close => None,
            })
            .collect()
    }
}

/// Connector handing every accepted connection to the test
pub struct MockConnector {
    remotes: Option<mpsc::UnboundedSender<MockRemote>>,
    attempts: Mutex<Vec<Instant>>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockRemote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            remotes: Some(tx),
            attempts: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    /// Connector whose every attempt is refused
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            remotes: None,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<SocketPair, SessionError> {
        self.attempts.lock().push(Instant::now());

        let remotes = self
            .remotes
            .as_ref()
            .ok_or_else(|| SessionError::ConnectionError("connection refused".to_string()))?;

        let (to_client, events) = mpsc::unbounded_channel();
        let (frames, from_client) = mpsc::unbounded_channel();
        remotes
            .send(MockRemote { to_client, from_client })
            .map_err(|_| SessionError::ConnectionError("no endpoint listening".to_string()))?;

        Ok(SocketPair {
            sink: Box::new(MockSink { frames }),
            stream: Box::new(MockStream { events }),
        })
    }
}

struct MockSink {
    frames: mpsc::UnboundedSender<ClientFrame>,
}

#[async_trait]
impl SocketSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.frames
            .send(ClientFrame::Text(text))
            .map_err(|_| SessionError::SendFailed("endpoint gone".to_string()))
    }

    async fn close(&mut self) {
        let _ = self.frames.send(ClientFrame::Close);
    }
}

struct MockStream {
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

#[async_trait]
impl SocketStream for MockStream {
    async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }
}

/// A session already in the `Open` state, plus its endpoint side
pub async fn open_session(config: SessionConfig) -> (SessionManager, MockRemote, Arc<MockConnector>) {
    let (connector, mut remotes) = MockConnector::new();
    let session = SessionManager::new(config, connector.clone());

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });
    let remote = remotes.recv().await.expect("connector dropped");
    remote.ready();
    pending
        .await
        .expect("connect task panicked")
        .expect("session failed to open");

    (session, remote, connector)
}
