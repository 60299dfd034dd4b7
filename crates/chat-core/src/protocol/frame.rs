//! Frame types exchanged between a chat client and the server's TCP transport.
//!
//! The chat payload itself is opaque to the transport; frames only add the
//! little control traffic the transport needs to mirror the connection
//! lifecycle across the wire:
//!
//! ```text
//! client                          server transport
//! ──────                          ────────────────
//! TCP connect           ───►      Connecting (status change queued)
//!                       ◄───      Accepted   (application accepted)
//! Data("hello")         ───►      IncomingMessage in the poll group
//!                       ◄───      Data("hello from someone else")
//! Close{reason, debug}  ───►      ClosedByPeer (status change queued)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while encoding, decoding, or transferring frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream failed (including clean EOF mid-frame).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded [`super::MAX_FRAME_SIZE`].
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The frame body could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] bincode::Error),
}

impl ProtocolError {
    /// `true` when the peer simply went away (EOF or reset), as opposed to
    /// sending something we could not understand.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// Server → client: the application accepted the connection.
    Accepted,
    /// Either direction: an opaque application payload.
    Data(Vec<u8>),
    /// Either direction: the sender is closing the connection.
    Close { reason: u32, debug: String },
}

impl Frame {
    /// Serializes the frame body (without the length prefix).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if `bincode` rejects the value.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a frame body produced by [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for bytes that are not a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
