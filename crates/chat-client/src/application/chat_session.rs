//! The chat session: one connection, one terminal.
//!
//! Each call to [`ChatSession::poll_once`] does two things, in this order:
//!
//! 1. Drain the link.  Relayed payloads are printed one per line; a close or
//!    a lost connection ends the session.
//! 2. Drain typed lines.  `/quit` disconnects; anything else is sent to the
//!    server as-is.
//!
//! # Why print with `from_utf8_lossy`? (for beginners)
//!
//! The server relays bytes without looking at them, so nothing guarantees a
//! payload is valid UTF-8.  `String::from_utf8_lossy` replaces invalid
//! sequences with `U+FFFD` instead of failing, which is the right trade for
//! text that is only ever displayed.

use std::io::Write;
use std::time::Duration;

use chat_core::{EndReason, PendingInput, ShutdownSignal};
use tracing::{debug, info, warn};

use super::link::{ChatLink, ClientError, LinkEvent};

/// Close reason text sent when the user leaves.
pub const GOODBYE: &str = "Goodbye";

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `/quit`: leave the chat.
    Quit,
    /// Anything else: a chat line for the other clients.
    Say(String),
}

impl ClientCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line == "/quit" {
            ClientCommand::Quit
        } else {
            ClientCommand::Say(line.to_string())
        }
    }
}

/// Drives a [`ChatLink`] from queued console input and prints to `output`.
pub struct ChatSession<L: ChatLink, W: Write> {
    link: L,
    output: W,
    input: PendingInput,
    shutdown: ShutdownSignal,
    disconnected: bool,
}

impl<L: ChatLink, W: Write> ChatSession<L, W> {
    pub fn new(link: L, output: W, input: PendingInput, shutdown: ShutdownSignal) -> Self {
        Self {
            link,
            output,
            input,
            shutdown,
            disconnected: false,
        }
    }

    /// Runs one iteration: link events first, then typed lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be written or a line cannot be
    /// sent because the connection is already gone.
    pub fn poll_once(&mut self) -> Result<(), ClientError> {
        self.drain_link()?;
        self.drain_console()
    }

    /// Polls every `interval` until the shutdown signal is set, then makes
    /// sure the server has been told.
    ///
    /// # Errors
    ///
    /// See [`ChatSession::poll_once`].
    pub async fn run(&mut self, interval: Duration) -> Result<(), ClientError> {
        while !self.shutdown.is_triggered() {
            self.poll_once()?;
            tokio::time::sleep(interval).await;
        }
        self.finish();
        Ok(())
    }

    /// Closes the connection unless that already happened.
    pub fn finish(&mut self) {
        if !self.disconnected {
            self.link.disconnect(EndReason::APP_GENERIC, GOODBYE);
            self.disconnected = true;
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn drain_link(&mut self) -> Result<(), ClientError> {
        while let Some(event) = self.link.poll_event() {
            match event {
                LinkEvent::Message(payload) => {
                    writeln!(self.output, "{}", String::from_utf8_lossy(&payload))?;
                    self.output.flush()?;
                }
                LinkEvent::Closed { reason, debug: detail } => {
                    info!("Server closed the connection ({reason}): {detail}");
                    self.end_session();
                }
                LinkEvent::Disconnected => {
                    warn!("Lost contact with the server");
                    self.end_session();
                }
            }
        }
        Ok(())
    }

    fn drain_console(&mut self) -> Result<(), ClientError> {
        while !self.disconnected {
            let Some(line) = self.input.try_dequeue() else {
                break;
            };
            match ClientCommand::parse(&line) {
                ClientCommand::Quit => {
                    info!("Disconnecting from chat server");
                    self.link.disconnect(EndReason::APP_GENERIC, GOODBYE);
                    self.end_session();
                }
                ClientCommand::Say(text) => {
                    debug!("sending {} bytes", text.len());
                    self.link.send_line(&text)?;
                }
            }
        }
        Ok(())
    }

    /// The connection is over from our side; nothing else should be sent.
    fn end_session(&mut self) {
        self.disconnected = true;
        self.shutdown.trigger();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
