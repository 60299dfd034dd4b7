//! The message-oriented transport the server is written against.
//!
//! A transport owns the sockets.  The application only ever sees opaque
//! handles ([`ConnectionHandle`], [`ListenSocket`], [`PollGroup`]) and two
//! queues it drains on its own schedule:
//!
//! - **status changes**: one [`StatusChange`] per connection state transition,
//!   in the order the transitions happened;
//! - **inbound messages**: payloads from every connection assigned to a poll
//!   group, retrieved with [`Transport::receive_messages_on_poll_group`].
//!
//! Every method takes `&self`.  Implementations keep their state behind
//! interior mutability because their own background threads write to it too.
//!
//! No method blocks on the network.  Sends only queue; a send that cannot be
//! queued is dropped when its [`DeliveryClass`] allows it and is an error
//! otherwise.
//!
//! # Testability
//!
//! Unit tests use the `mockall`-generated `MockTransport` to assert exact
//! calls; scenario tests use
//! [`crate::infrastructure::transport::memory::InMemoryTransport`].

use std::net::SocketAddr;

use chat_core::{
    ConnectionHandle, ConnectionState, DeliveryClass, EndReason, IncomingMessage, ListenSocket,
    PollGroup, ProtocolError, StatusChange,
};
use thiserror::Error;

/// Errors a transport reports back to the application.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handle does not name a connection the transport knows about.
    #[error("invalid connection handle {0}")]
    InvalidConnection(ConnectionHandle),

    /// The connection exists but is in the wrong state for the request.
    #[error("connection {connection} is {state}")]
    InvalidState {
        connection: ConnectionHandle,
        state: ConnectionState,
    },

    /// The poll group handle is unknown or already destroyed.
    #[error("invalid poll group {0:?}")]
    InvalidPollGroup(PollGroup),

    /// The listen socket handle is unknown or already closed.
    #[error("invalid listen socket {0:?}")]
    InvalidListenSocket(ListenSocket),

    /// A reliable send found the connection's outbound queue full.  The
    /// transport ends such a connection as a local problem.
    #[error("outbound queue for connection {0} is full")]
    QueueFull(ConnectionHandle),

    /// The connection's writer has already stopped.
    #[error("connection {0} can no longer be written")]
    WriterStopped(ConnectionHandle),

    /// A listening endpoint could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Any other socket-level failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be written or read.
    #[error("transport protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Handle-based, message-oriented transport.
///
/// See the module documentation for the contract shared by all methods.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Starts listening on `addr`.
    fn create_listen_socket(&self, addr: SocketAddr) -> Result<ListenSocket, TransportError>;

    /// Returns the address `socket` is actually bound to (useful with port 0).
    fn listen_addr(&self, socket: ListenSocket) -> Option<SocketAddr>;

    /// Stops accepting on `socket`.  Returns `false` for an unknown handle.
    fn close_listen_socket(&self, socket: ListenSocket) -> bool;

    /// Creates a receive group that connections can be assigned to.
    fn create_poll_group(&self) -> Result<PollGroup, TransportError>;

    /// Destroys `group`.  Returns `false` for an unknown handle.
    fn destroy_poll_group(&self, group: PollGroup) -> bool;

    /// Removes and returns every status change queued since the last call,
    /// oldest first.
    fn drain_status_changes(&self) -> Vec<StatusChange>;

    /// Accepts a connection that is in the `Connecting` state.
    fn accept_connection(&self, handle: ConnectionHandle) -> Result<(), TransportError>;

    /// Closes a connection from the application side.
    ///
    /// With `linger` set, data already queued for the peer is delivered
    /// before the connection is released.  Returns `false` for an unknown
    /// handle.
    fn close_connection(
        &self,
        handle: ConnectionHandle,
        reason: EndReason,
        debug: &str,
        linger: bool,
    ) -> bool;

    /// Routes the inbound messages of `handle` into `group`.
    fn set_connection_poll_group(
        &self,
        handle: ConnectionHandle,
        group: PollGroup,
    ) -> Result<(), TransportError>;

    /// Queues `payload` for delivery to `handle`.
    ///
    /// An unreliable send that finds no room is dropped and still returns
    /// `Ok(())`.
    fn send_message_to_connection(
        &self,
        handle: ConnectionHandle,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<(), TransportError>;

    /// Returns up to `max_messages` inbound messages from `group`, oldest
    /// first.  An empty vector means nothing is pending.
    fn receive_messages_on_poll_group(
        &self,
        group: PollGroup,
        max_messages: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_error_names_connection_and_state() {
        let err = TransportError::InvalidState {
            connection: ConnectionHandle(7),
            state: ConnectionState::ClosedByPeer,
        };
        assert_eq!(err.to_string(), "connection #7 is closed by peer");
    }

    #[test]
    fn test_io_error_converts_into_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
