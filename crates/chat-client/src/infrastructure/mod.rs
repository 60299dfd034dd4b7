//! Infrastructure layer for the chat client.

pub mod network;
