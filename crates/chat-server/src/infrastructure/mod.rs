//! Infrastructure layer for the chat server.
//!
//! Contains the OS-facing adapters: the transports that own sockets,
//! configuration file loading, and logging setup.
//!
//! **Dependency rule**: this layer may depend on `application` and `chat_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod logging;
pub mod storage;
pub mod transport;
