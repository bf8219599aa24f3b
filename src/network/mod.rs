//! Network subsystem: socket transport, reconnection policy and the session
//! state machine

pub mod reconnect;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use reconnect::ReconnectPolicy;
pub use session::{ConnectionState, SessionManager, SessionStats};
pub use transport::{Connector, SocketEvent, SocketPair, SocketSink, SocketStream, WsConnector};
