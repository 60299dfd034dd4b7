//! Protocol module containing the frame types and the stream framing.

pub mod frame;
pub mod framing;

pub use frame::{Frame, ProtocolError};
pub use framing::{body_len, encode_frame, read_frame, write_frame, MAX_FRAME_SIZE};
