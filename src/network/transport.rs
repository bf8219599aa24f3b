//! Duplex socket primitive
//!
//! The session manager only needs text frames in both directions plus
//! close and error notifications. [`WsConnector`] provides them over a
//! WebSocket; tests substitute in-memory doubles.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::SessionError;
use crate::protocol::CLOSE_ABNORMAL;

/// Close code reported when a close frame carried no status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Something that happened on the receiving side of a socket
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Sending half of an open socket
#[async_trait]
pub trait SocketSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Start the closing handshake; errors are ignored
    async fn close(&mut self);
}

/// Receiving half of an open socket
#[async_trait]
pub trait SocketStream: Send {
    /// Next event, or `None` once the stream ended without a close frame
    async fn next_event(&mut self) -> Option<SocketEvent>;
}

/// An open socket split into its two halves
pub struct SocketPair {
    pub sink: Box<dyn SocketSink>,
    pub stream: Box<dyn SocketStream>,
}

/// Opens sockets to an endpoint URL
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<SocketPair, SessionError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector (`ws://` and `wss://`)
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair, SessionError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectionError(e.to_string()))?;

        tracing::debug!("WebSocket handshake complete ({})", response.status());

        let (sink, stream) = ws.split();
        Ok(SocketPair {
            sink: Box::new(WsSink { inner: sink }),
            stream: Box::new(WsReader { inner: stream }),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl SocketSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| SessionError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            tracing::debug!("Close frame not sent: {}", e);
        }
        let _ = self.inner.close().await;
    }
}

struct WsReader {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl SocketStream for WsReader {
    async fn next_event(&mut self) -> Option<SocketEvent> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(SocketEvent::Text(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(SocketEvent::Text(text)),
                    Err(_) => tracing::warn!("Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return Some(SocketEvent::Closed { code, reason });
                }
                Ok(_) => continue,
                Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => {
                    return Some(SocketEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "connection closed".to_string(),
                    })
                }
                Err(e) => return Some(SocketEvent::Error(e.to_string())),
            }
        }
    }
}
