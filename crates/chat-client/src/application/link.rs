//! The client's view of its connection to the chat server.
//!
//! [`ChatLink`] is deliberately synchronous: sending only queues a frame and
//! polling only drains what the network side has already received, so the
//! session can run inside the same 10 ms loop shape as the server.

use chat_core::{EndReason, ProtocolError};
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection to the server could not be established.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server did not accept the connection in time.
    #[error("server at {addr} did not accept the connection within the timeout")]
    HandshakeTimeout { addr: String },

    /// The server closed the connection instead of accepting it.
    #[error("server rejected the connection ({reason}): {debug}")]
    Rejected { reason: EndReason, debug: String },

    /// The server sent a payload before accepting the connection.
    #[error("server sent data before accepting the connection")]
    UnexpectedFrame,

    /// The connection is gone; nothing more can be sent.
    #[error("connection to the server is closed")]
    LinkClosed,

    /// Writing to the local terminal failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be read or written.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Something the network side observed since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A payload relayed from another client.
    Message(Vec<u8>),
    /// The server closed the connection and said why.
    Closed { reason: EndReason, debug: String },
    /// The stream ended without a close frame.
    Disconnected,
}

/// An accepted connection to the chat server.
#[cfg_attr(test, mockall::automock)]
pub trait ChatLink {
    /// Queues `line` for delivery to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::LinkClosed`] once the connection is gone.
    fn send_line(&mut self, line: &str) -> Result<(), ClientError>;

    /// Returns the next received event, or `None` if nothing is waiting.
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Asks the server to close the connection.  Safe to call more than once.
    fn disconnect(&mut self, reason: EndReason, debug: &str);
}
