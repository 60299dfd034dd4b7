//! The server event loop.
//!
//! # How the loop works (for beginners)
//!
//! The server is single-threaded and never blocks on I/O.  Every iteration it
//! drains three queues and then sleeps for a short, fixed interval:
//!
//! ```text
//! loop until shutdown:
//!   1. inbound messages   ──► message_relay::drain_and_broadcast
//!   2. status changes     ──► lifecycle::drain
//!   3. console lines      ──► ConsoleCommand::parse
//!   4. sleep poll_interval (10 ms by default)
//! then:
//!   shutdown(): notify clients, close them (lingering), release the listener
//! ```
//!
//! The transport fills the first two queues from its own threads; the console
//! reader thread fills the third.  Because only this loop touches the
//! [`ConnectionTable`], the table needs no lock.
//!
//! The loop ends when the shared [`ShutdownSignal`] is set, whether by
//! `/quit`, Ctrl-C, or the console reaching end of input.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use chat_core::{
    EndReason, ListenSocket, PendingInput, PollGroup, ShutdownSignal, DEFAULT_SERVER_PORT,
};
use thiserror::Error;
use tracing::{debug, info};

use super::connection_table::ConnectionTable;
use super::console::ConsoleCommand;
use super::lifecycle;
use super::message_relay;
use super::transport::{Transport, TransportError};

/// Text every client receives when the server shuts down.
pub const DEFAULT_SHUTDOWN_NOTICE: &str = "Server is shutting down.  Goodbye.";

/// End-reason debug text attached to the shutdown close.
pub const SHUTDOWN_CLOSE_DEBUG: &str = "Server Shutdown";

/// Fatal server errors.  Any of these ends the process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen socket could not be created.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },

    /// The poll group could not be created.
    #[error("failed to create poll group: {0}")]
    PollGroup(#[source] TransportError),

    /// Polling for inbound messages failed.
    #[error("failed to receive messages: {0}")]
    Receive(#[source] TransportError),
}

/// Runtime settings for [`ChatServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address and port to accept connections on.
    pub listen_addr: SocketAddr,
    /// Sleep between two loop iterations.
    pub poll_interval: Duration,
    /// Sent to every client during shutdown.
    pub shutdown_notice: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_SERVER_PORT,
            )),
            poll_interval: Duration::from_millis(10),
            shutdown_notice: DEFAULT_SHUTDOWN_NOTICE.to_string(),
        }
    }
}

/// The chat relay server, generic over its transport.
pub struct ChatServer<T: Transport> {
    transport: T,
    settings: ServerSettings,
    table: ConnectionTable,
    /// `None` once [`ChatServer::shutdown`] has released the listener.
    listen_socket: Option<ListenSocket>,
    poll_group: PollGroup,
    input: PendingInput,
    shutdown: ShutdownSignal,
}

impl<T: Transport> ChatServer<T> {
    /// Opens the listen socket and the poll group.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listen`] or [`ServerError::PollGroup`] if the
    /// transport cannot create either resource.  Nothing is left open on
    /// failure.
    pub fn start(
        transport: T,
        settings: ServerSettings,
        input: PendingInput,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ServerError> {
        let addr = settings.listen_addr;
        let listen_socket = transport
            .create_listen_socket(addr)
            .map_err(|source| ServerError::Listen { addr, source })?;

        let poll_group = match transport.create_poll_group() {
            Ok(group) => group,
            Err(e) => {
                transport.close_listen_socket(listen_socket);
                return Err(ServerError::PollGroup(e));
            }
        };

        let port = transport
            .listen_addr(listen_socket)
            .map_or(addr.port(), |bound| bound.port());
        info!("Server listening on port {port}");

        Ok(Self {
            transport,
            settings,
            table: ConnectionTable::new(),
            listen_socket: Some(listen_socket),
            poll_group,
            input,
            shutdown,
        })
    }

    /// Runs one loop iteration without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Receive`] if the transport fails to deliver
    /// inbound messages.
    pub fn poll_once(&mut self) -> Result<(), ServerError> {
        message_relay::drain_and_broadcast(
            &self.transport,
            &self.table,
            self.poll_group,
            &self.shutdown,
        )
        .map_err(ServerError::Receive)?;
        lifecycle::drain(&self.transport, &mut self.table, self.poll_group);
        self.drain_console();
        Ok(())
    }

    /// Loops until the shutdown signal is set, then runs [`ChatServer::shutdown`].
    ///
    /// # Errors
    ///
    /// Propagates the first fatal [`ServerError`]; the shutdown sequence is
    /// skipped in that case.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        while !self.shutdown.is_triggered() {
            self.poll_once()?;
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        self.shutdown();
        Ok(())
    }

    /// Notifies and closes every client, then releases the listener and the
    /// poll group.  Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        let Some(listen_socket) = self.listen_socket.take() else {
            return;
        };

        info!("Closing connections...");
        message_relay::broadcast(
            &self.transport,
            &self.table,
            self.settings.shutdown_notice.as_bytes(),
            None,
        );
        for (handle, record) in self.table.drain() {
            debug!(connection = %handle, "closing {}", record.description);
            self.transport
                .close_connection(handle, EndReason::APP_GENERIC, SHUTDOWN_CLOSE_DEBUG, true);
        }

        self.transport.close_listen_socket(listen_socket);
        self.transport.destroy_poll_group(self.poll_group);
    }

    fn drain_console(&mut self) {
        while !self.shutdown.is_triggered() {
            let Some(line) = self.input.try_dequeue() else {
                break;
            };
            match ConsoleCommand::parse(&line) {
                ConsoleCommand::Quit => {
                    info!("Shutting down server");
                    self.shutdown.trigger();
                }
                ConsoleCommand::Unknown(_) => {
                    info!("The server only knows one command: '/quit'");
                }
            }
        }
    }

    /// Address the listener is bound to, while it is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listen_socket
            .and_then(|socket| self.transport.listen_addr(socket))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn poll_group(&self) -> PollGroup {
        self.poll_group
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// `true` until [`ChatServer::shutdown`] has run.
    pub fn is_listening(&self) -> bool {
        self.listen_socket.is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
