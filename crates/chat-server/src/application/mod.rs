//! Application layer of the chat relay server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (the connection vocabulary in `chat_core`) and the infrastructure
//! (sockets, files, the terminal).  Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil the server's job: keep track of
//!   who is connected and fan every message out to everyone else.
//! - **Depends on abstractions** (the [`transport::Transport`] trait) rather
//!   than on TCP, so tests can drive it with a scripted transport.
//! - **Contains no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`transport`** – The trait every message-oriented transport implements,
//!   plus its error type.
//!
//! - **`connection_table`** – The registry of live connections, keyed by
//!   connection handle.
//!
//! - **`lifecycle`** – The connection state machine: turns transport status
//!   changes into accept/close decisions and table updates.
//!
//! - **`message_relay`** – Drains inbound messages and broadcasts each one to
//!   every other live connection.
//!
//! - **`console`** – Interprets operator commands typed on stdin.
//!
//! - **`server`** – The event loop that ties everything together and owns the
//!   shutdown sequence.

pub mod connection_table;
pub mod console;
pub mod lifecycle;
pub mod message_relay;
pub mod server;
pub mod transport;
