//! # chat-core
//!
//! Shared library for the chat relay containing the connection domain model,
//! the TCP wire framing, and the console input relay.
//!
//! This crate is used by both the server and the client applications.  It
//! never opens a socket itself; the transports that do live in the server and
//! client crates.
//!
//! # Architecture overview (for beginners)
//!
//! The chat relay is a hub: every client connects to one server, and every
//! line a client sends is forwarded by the server to all *other* connected
//! clients.  The server never interprets the text; it only tracks who is
//! connected right now and fans payloads out.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`domain`** – The vocabulary of a message-oriented transport: connection
//!   handles, connection states, state-change notifications, end reasons, and
//!   delivery classes.
//!
//! - **`protocol`** – How bytes travel between a client and the server's TCP
//!   transport: a 4-byte length prefix followed by a `bincode`-encoded frame.
//!
//! - **`console`** – The input relay that turns a blocking line reader
//!   (normally stdin) into a queue the non-blocking main loop can drain.
//!
//! - **`shutdown`** – The one-way shutdown signal shared by every loop, and the
//!   hard-stop escape hatch for readers that cannot be woken.

pub mod console;
pub mod domain;
pub mod protocol;
pub mod shutdown;

// Re-export the most-used types at the crate root so callers can write
// `chat_core::ConnectionHandle` instead of
// `chat_core::domain::connection::ConnectionHandle`.
pub use console::{spawn_line_reader, PendingInput};
pub use domain::connection::{
    ConnectionHandle, ConnectionInfo, ConnectionState, IncomingMessage, ListenSocket, PollGroup,
    StatusChange,
};
pub use domain::delivery::DeliveryClass;
pub use domain::end_reason::EndReason;
pub use protocol::{body_len, encode_frame, read_frame, write_frame, Frame, ProtocolError};
pub use shutdown::{hard_stop, ShutdownSignal};

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_SERVER_PORT: u16 = 27020;
