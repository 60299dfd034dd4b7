//! Domain entities for the chat relay.
//!
//! This module contains pure data types with no infrastructure dependencies.
//! They describe what a message-oriented transport reports to the
//! application, independently of how any particular transport is built:
//!
//! - **`connection`** – handles, states, the status-change notification, and
//!   the inbound message object.
//! - **`end_reason`** – numeric codes explaining why a connection ended.
//! - **`delivery`** – the reliability/latency hint attached to every send.

pub mod connection;
pub mod delivery;
pub mod end_reason;
