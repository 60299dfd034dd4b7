//! Length-delimited frame transfer over a byte stream.
//!
//! Wire format:
//! ```text
//! [body_len:4 (big-endian)][body:N (bincode-encoded Frame)]
//! ```

use std::io::{Read, Write};

use super::frame::{Frame, ProtocolError};

/// Largest frame body accepted in either direction (512 KiB).
pub const MAX_FRAME_SIZE: usize = 512 * 1024;

/// Encodes `frame` into its complete wire form: length prefix plus body.
///
/// Transports that hand bytes to a writer thread or task encode up front with
/// this, so size errors surface to the caller instead of the writer.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the encoded body exceeds
/// [`MAX_FRAME_SIZE`], or [`ProtocolError::Malformed`] if encoding fails.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let body = frame.encode()?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Validates a received length prefix and returns the body length.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the prefix exceeds
/// [`MAX_FRAME_SIZE`].
pub fn body_len(prefix: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

/// Writes one frame and flushes the writer.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] before touching the stream if the
/// encoded body exceeds [`MAX_FRAME_SIZE`], or [`ProtocolError::Io`] if the
/// write fails.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError> {
    // Prefix and body go out in one write so concurrent writers holding the
    // same lock never interleave partial frames.
    let buf = encode_frame(frame)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one frame, blocking until it is complete.
///
/// # Errors
///
/// Returns [`ProtocolError::Io`] with `UnexpectedEof` if the stream ends
/// before or during a frame, [`ProtocolError::FrameTooLarge`] if the length
/// prefix exceeds [`MAX_FRAME_SIZE`], and [`ProtocolError::Malformed`] if the
/// body does not decode.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = body_len(len_buf)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Frame::decode(&body)
}
