//! Implementations of [`crate::application::transport::Transport`].
//!
//! # Sub-modules
//!
//! - **`tcp`** – The production transport.  One acceptor thread per listen
//!   socket and one reader thread per connection feed the status-change and
//!   inbound-message queues; frames use the `chat_core::protocol` format.
//!
//! - **`memory`** – A scripted transport with no sockets at all.  Tests (and
//!   anything embedding the server) inject connection attempts, messages, and
//!   failures, then inspect what the server did.

pub mod memory;
pub mod tcp;

pub use memory::{InMemoryTransport, SentMessage, TransportCall};
pub use tcp::TcpTransport;
