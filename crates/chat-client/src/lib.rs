//! # chat-client
//!
//! Terminal client for the chat relay.  It connects to a server over the TCP
//! wire format from `chat-core`, sends every line the user types, and prints
//! every payload the server relays from other clients.
//!
//! - **`application`** – the chat session: what to do with each network event
//!   and each typed line, independent of how the connection is made.
//! - **`infrastructure`** – the tokio TCP connection to the server.

pub mod application;
pub mod infrastructure;
