//! Connection handles, states, and the notifications a transport emits.
//!
//! # Connection lifecycle (for beginners)
//!
//! Every connection a transport hands to the application moves through these
//! states, and the transport reports each move exactly once, in order:
//!
//! ```text
//! None  ──►  Connecting  ──►  Connected  ──►  ClosedByPeer
//!                 │                      └──►  ProblemDetectedLocally
//!                 └──► (closed before it was ever accepted)
//! ```
//!
//! - `Connecting`: a peer asked to connect; the application must accept it.
//! - `Connected`: the accept completed and payloads can flow.
//! - `ClosedByPeer`: the remote side ended the session.
//! - `ProblemDetectedLocally`: the local side gave up (I/O error, timeout).
//! - `None`: the application destroyed the connection itself.  Transports
//!   report this as a final bookkeeping notification.

use std::fmt;

use super::end_reason::EndReason;

/// Opaque, transport-issued identifier for one connection attempt.
///
/// A transport never reuses a handle, so a handle stays unambiguous for as
/// long as the application keeps it in its tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u32);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a listening endpoint owned by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenSocket(pub u32);

/// Opaque handle to a receive group.
///
/// A poll group lets the application poll the inbound messages of many
/// connections with a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollGroup(pub u32);

/// State of a single connection as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection, or the application has destroyed it.
    None,
    /// A peer is attempting to connect and awaits acceptance.
    Connecting,
    /// The connection is established.
    Connected,
    /// The remote peer closed the connection.
    ClosedByPeer,
    /// The local side detected a fatal problem (I/O error, bad frame, timeout).
    ProblemDetectedLocally,
}

impl ConnectionState {
    /// Returns `true` for the two states in which the application considers
    /// the connection alive.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Returns `true` for states that end a session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ClosedByPeer => "closed by peer",
            ConnectionState::ProblemDetectedLocally => "problem detected locally",
        };
        f.write_str(name)
    }
}

/// Snapshot of a connection carried by every [`StatusChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Human-readable description, e.g. `"#3 127.0.0.1:51234"`.
    pub description: String,
    /// The state the connection just entered.
    pub state: ConnectionState,
    /// Why the connection ended; [`EndReason::INVALID`] while it is alive.
    pub end_reason: EndReason,
    /// Free-form diagnostic text accompanying `end_reason`.
    pub end_debug: String,
}

impl ConnectionInfo {
    /// Builds the info for a live connection (no end reason).
    pub fn live(description: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            description: description.into(),
            state,
            end_reason: EndReason::INVALID,
            end_debug: String::new(),
        }
    }
}

/// One connection-state transition, as queued by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub connection: ConnectionHandle,
    /// The state the connection was in before this transition.
    pub old_state: ConnectionState,
    pub info: ConnectionInfo,
}

impl StatusChange {
    /// The state the connection moved into.
    pub fn new_state(&self) -> ConnectionState {
        self.info.state
    }
}

/// An inbound payload waiting in a poll group.
///
/// The transport owns the buffer until the application has copied what it
/// needs and called [`IncomingMessage::release`].  Nothing may assume the
/// buffer outlives that call.
#[derive(Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    connection: ConnectionHandle,
    message_number: u64,
    payload: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(connection: ConnectionHandle, message_number: u64, payload: Vec<u8>) -> Self {
        Self {
            connection,
            message_number,
            payload,
        }
    }

    /// The connection the message arrived on.
    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Per-connection sequence number assigned by the transport, starting at 1.
    pub fn message_number(&self) -> u64 {
        self.message_number
    }

    /// Borrows the payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Hands the message back to the transport.
    pub fn release(self) {}
}
