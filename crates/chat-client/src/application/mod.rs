//! Application layer for the chat client.
//!
//! - [`link`] – the port to the server: what the session needs from a
//!   connection, whatever carries it.
//! - [`chat_session`] – prints what arrives, sends what is typed, and decides
//!   when the session is over.

pub mod chat_session;
pub mod link;
