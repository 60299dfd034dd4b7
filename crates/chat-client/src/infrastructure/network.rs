//! TCP connection to the chat server.
//!
//! [`ServerConnection::connect`] opens the stream and waits for the server's
//! `Accepted` frame.  After that the stream is split and handed to two tasks:
//!
//! ```text
//!                 ┌──────────────┐  Frame  ┌──────────────┐
//! send_line() ──► │ outbound mpsc │ ──────► │ writer task  │ ──► TCP
//!                 └──────────────┘         └──────────────┘
//!                 ┌──────────────┐ LinkEvent┌──────────────┐
//! poll_event() ◄─ │ inbound mpsc  │ ◄────── │ reader task  │ ◄── TCP
//!                 └──────────────┘         └──────────────┘
//! ```
//!
//! Both channels are unbounded, so the session never awaits: it queues and
//! drains.  Dropping the connection drops the outbound sender, which ends the
//! writer task and closes our half of the stream.
//!
//! Frames use the same layout as `chat_core::protocol`: a 4-byte big-endian
//! length followed by the encoded [`Frame`].  The async helpers at the bottom
//! only move bytes; encoding and the size limit come from
//! [`chat_core::encode_frame`] and [`chat_core::body_len`].

use std::time::Duration;

use chat_core::{body_len, encode_frame, EndReason, Frame, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::link::{ChatLink, ClientError, LinkEvent};

/// How long to wait for the server to accept a new connection by default.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// An accepted connection to the chat server.
#[derive(Debug)]
pub struct ServerConnection {
    server_addr: String,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    closing: bool,
}

impl ServerConnection {
    /// Connects to `server_addr` and waits up to `handshake_timeout` for the
    /// server to accept.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectFailed`] if the TCP connection fails.
    /// - [`ClientError::HandshakeTimeout`] if no frame arrives in time.
    /// - [`ClientError::Rejected`] if the server closes instead of accepting.
    /// - [`ClientError::UnexpectedFrame`] if data arrives before acceptance.
    /// - [`ClientError::Protocol`] if the stream fails during the handshake.
    pub async fn connect(
        server_addr: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, ClientError> {
        info!("Connecting to chat server at {server_addr}");
        let stream =
            TcpStream::connect(server_addr)
                .await
                .map_err(|source| ClientError::ConnectFailed {
                    addr: server_addr.to_string(),
                    source,
                })?;
        stream.set_nodelay(true).map_err(ProtocolError::Io)?;
        let (mut read_half, write_half) = stream.into_split();

        let first = time::timeout(handshake_timeout, read_frame_async(&mut read_half))
            .await
            .map_err(|_| ClientError::HandshakeTimeout {
                addr: server_addr.to_string(),
            })??;
        match first {
            Frame::Accepted => {}
            Frame::Close { reason, debug } => {
                return Err(ClientError::Rejected {
                    reason: EndReason(reason),
                    debug,
                })
            }
            Frame::Data(_) => return Err(ClientError::UnexpectedFrame),
        }
        info!("Connected to chat server at {server_addr}");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(write_half, outbound_rx));
        tokio::spawn(read_loop(read_half, inbound_tx));

        Ok(Self {
            server_addr: server_addr.to_string(),
            outbound: outbound_tx,
            inbound: inbound_rx,
            closing: false,
        })
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }
}

impl ChatLink for ServerConnection {
    fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        if self.closing {
            return Err(ClientError::LinkClosed);
        }
        self.outbound
            .send(Frame::Data(line.as_bytes().to_vec()))
            .map_err(|_| ClientError::LinkClosed)
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inbound.try_recv().ok()
    }

    fn disconnect(&mut self, reason: EndReason, debug: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        let close = Frame::Close {
            reason: reason.code(),
            debug: debug.to_string(),
        };
        if self.outbound.send(close).is_err() {
            debug!("connection to {} already gone; close not sent", self.server_addr);
        }
    }
}

/// Writes queued frames until the channel closes or a `Close` frame is sent.
async fn write_loop(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        let is_close = matches!(frame, Frame::Close { .. });
        if let Err(e) = write_frame_async(&mut writer, &frame).await {
            debug!("write to server failed: {e}");
            break;
        }
        if is_close {
            break;
        }
    }
    // Flushes pending bytes and sends FIN; the server sees end-of-stream.
    if let Err(e) = writer.shutdown().await {
        debug!("shutdown of write half failed: {e}");
    }
}

/// Forwards received frames as [`LinkEvent`]s until the stream ends.
async fn read_loop(mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<LinkEvent>) {
    loop {
        let event = match read_frame_async(&mut reader).await {
            Ok(Frame::Data(payload)) => LinkEvent::Message(payload),
            Ok(Frame::Close { reason, debug }) => {
                let _ = events.send(LinkEvent::Closed {
                    reason: EndReason(reason),
                    debug,
                });
                return;
            }
            Ok(Frame::Accepted) => {
                debug!("ignoring repeated accept frame");
                continue;
            }
            Err(e) => {
                if !e.is_disconnect() {
                    warn!("read from server failed: {e}");
                }
                let _ = events.send(LinkEvent::Disconnected);
                return;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

async fn read_frame_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let mut body = vec![0u8; body_len(len_buf)?];
    reader.read_exact(&mut body).await?;
    Frame::decode(&body)
}

async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), ProtocolError> {
    let buf = encode_frame(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
