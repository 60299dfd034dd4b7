//! Integration tests for the chat server event loop.
//!
//! These drive a complete `ChatServer` through `InMemoryTransport`, which plays
//! the network: tests script connection attempts, payloads, and failures, then
//! inspect the table and every call the server made on the transport.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use chat_core::{ConnectionHandle, ConnectionState, DeliveryClass, EndReason, PendingInput, ShutdownSignal};
use chat_server::application::server::{ChatServer, ServerError, ServerSettings};
use chat_server::infrastructure::transport::{InMemoryTransport, TransportCall};

const NOTICE: &[u8] = b"Server is shutting down.  Goodbye.";

struct Harness {
    server: ChatServer<InMemoryTransport>,
    net: InMemoryTransport,
    input: PendingInput,
    shutdown: ShutdownSignal,
}

impl Harness {
    fn start() -> Self {
        let net = InMemoryTransport::new();
        let input = PendingInput::new();
        let shutdown = ShutdownSignal::new();
        let server = ChatServer::start(
            net.clone(),
            ServerSettings::default(),
            input.clone(),
            shutdown.clone(),
        )
        .expect("server must start");
        Self {
            server,
            net,
            input,
            shutdown,
        }
    }

    /// Runs enough iterations for every queued transition to settle.
    fn settle(&mut self) {
        for _ in 0..3 {
            self.server.poll_once().expect("poll");
        }
    }

    /// Connects a peer and lets the server admit it.
    fn admit(&mut self, peer: &str) -> ConnectionHandle {
        let handle = self.net.connect(peer);
        self.settle();
        handle
    }

    fn sends_to(&self, handle: ConnectionHandle) -> usize {
        self.net
            .calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Send { connection, .. } if *connection == handle))
            .count()
    }
}

/// Collects formatted log output so tests can assert on it.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ── One client connects ───────────────────────────────────────────────────────

#[test]
fn test_single_client_is_tracked_after_connecting() {
    // Arrange
    let mut h = Harness::start();

    // Act
    let x = h.admit("10.0.0.1:5000");

    // Assert
    assert_eq!(h.server.table().handles(), vec![x]);
    assert_eq!(h.net.connection_state(x), Some(ConnectionState::Connected));
    assert!(h.net.calls().contains(&TransportCall::Accept(x)));
    assert!(h
        .net
        .calls()
        .contains(&TransportCall::SetPollGroup(x, h.server.poll_group())));
}

// ── Broadcast skips the sender ────────────────────────────────────────────────

#[test]
fn test_message_reaches_other_client_but_not_sender() {
    // Arrange
    let mut h = Harness::start();
    let x = h.admit("10.0.0.1:5000");
    let y = h.admit("10.0.0.2:5000");

    // Act
    h.net.deliver(x, b"hello");
    h.server.poll_once().expect("poll");

    // Assert
    assert_eq!(h.net.sent_to(y), vec![b"hello".to_vec()]);
    assert!(h.net.sent_to(x).is_empty());
    assert!(h
        .net
        .sent()
        .iter()
        .all(|m| m.class == DeliveryClass::UnreliableNoDelay));
}

#[test]
fn test_payload_bytes_are_relayed_unmodified() {
    let mut h = Harness::start();
    let x = h.admit("a");
    let y = h.admit("b");
    let payload = [0xff, 0x00, b'h', b'i', 0xc3];

    h.net.deliver(x, &payload);
    h.server.poll_once().expect("poll");

    assert_eq!(h.net.sent_to(y), vec![payload.to_vec()]);
}

#[test]
fn test_broadcast_reaches_every_other_client() {
    let mut h = Harness::start();
    let clients: Vec<_> = (0..4).map(|i| h.admit(&format!("10.0.0.{i}:5000"))).collect();

    h.net.deliver(clients[2], b"fan out");
    h.server.poll_once().expect("poll");

    for (i, &client) in clients.iter().enumerate() {
        let expected = if i == 2 { 0 } else { 1 };
        assert_eq!(h.net.sent_to(client).len(), expected, "client {client}");
    }
}

// ── Peer closes ───────────────────────────────────────────────────────────────

#[test]
fn test_peer_close_removes_client_and_releases_connection() {
    // Arrange
    let mut h = Harness::start();
    let x = h.admit("10.0.0.1:5000");

    let log = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_ansi(false)
        .finish();

    // Act
    h.net.close_by_peer(x, EndReason::REMOTE_GENERIC, "client went away");
    tracing::subscriber::with_default(subscriber, || h.server.poll_once().expect("poll"));

    // Assert
    let logged = log.contents();
    assert!(logged.contains("reason 4000: client went away"), "log was: {logged}");
    assert!(h.server.table().is_empty());
    assert!(h.net.calls().contains(&TransportCall::Close {
        connection: x,
        reason: EndReason::INVALID,
        debug: String::new(),
        linger: false,
    }));
    assert_eq!(h.net.connection_state(x), None);
}

#[test]
fn test_local_problem_removes_client() {
    let mut h = Harness::start();
    let x = h.admit("a");
    let y = h.admit("b");

    h.net.report_local_problem(x, "timed out");
    h.server.poll_once().expect("poll");
    h.net.deliver(y, b"anyone?");
    h.server.poll_once().expect("poll");

    assert_eq!(h.server.table().handles(), vec![y]);
    assert!(h.net.sent_to(x).is_empty());
}

#[test]
fn test_close_before_accept_leaves_no_record() {
    let mut h = Harness::start();
    let x = h.net.connect("impatient");
    h.net.close_by_peer(x, EndReason::REMOTE_GENERIC, "gave up");

    h.settle();

    assert!(h.server.table().is_empty());
}

// ── Operator /quit ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_quit_notifies_every_client_before_releasing_listener() {
    // Arrange
    let mut h = Harness::start();
    let x = h.admit("a");
    let y = h.admit("b");
    h.input.enqueue_line("/quit");

    // Act
    h.server.run().await.expect("run");

    // Assert
    assert!(h.shutdown.is_triggered());
    assert!(h.server.table().is_empty());
    assert_eq!(h.net.open_listen_sockets(), 0);
    assert_eq!(h.net.open_poll_groups(), 0);
    assert_eq!(h.net.sent_to(x), vec![NOTICE.to_vec()]);
    assert_eq!(h.net.sent_to(y), vec![NOTICE.to_vec()]);

    let calls = h.net.calls();
    let position = |pred: &dyn Fn(&TransportCall) -> bool| {
        calls.iter().rposition(|c| pred(c)).expect("call present")
    };
    let last_notice = position(&|c| matches!(c, TransportCall::Send { .. }));
    let last_close = position(&|c| {
        matches!(
            c,
            TransportCall::Close { reason, debug, linger: true, .. }
                if *reason == EndReason::APP_GENERIC && debug == "Server Shutdown"
        )
    });
    let listener_closed = position(&|c| matches!(c, TransportCall::CloseListenSocket(_)));
    let group_destroyed = position(&|c| matches!(c, TransportCall::DestroyPollGroup(_)));
    assert!(last_notice < listener_closed);
    assert!(last_close < listener_closed);
    assert!(listener_closed < group_destroyed);
}

#[tokio::test]
async fn test_external_shutdown_signal_stops_run() {
    let mut h = Harness::start();
    h.admit("a");
    h.shutdown.trigger();

    h.server.run().await.expect("run");

    assert!(!h.server.is_listening());
}

#[test]
fn test_unknown_console_command_keeps_server_running() {
    let mut h = Harness::start();
    h.input.enqueue_line("/help");
    h.input.enqueue_line("   ");

    h.server.poll_once().expect("poll");

    assert!(!h.shutdown.is_triggered());
    assert!(h.input.is_empty());
}

// ── Accept fails ──────────────────────────────────────────────────────────────

#[test]
fn test_failed_accept_leaves_no_record_and_gets_no_traffic() {
    // Arrange
    let mut h = Harness::start();
    h.net.fail_accepts(true);
    let x = h.net.connect("10.0.0.9:5000");
    h.settle();
    h.net.fail_accepts(false);
    let y = h.admit("a");
    let z = h.admit("b");

    // Act
    h.net.deliver(y, b"hello");
    h.server.poll_once().expect("poll");

    // Assert
    assert_eq!(h.server.table().handles(), vec![y, z]);
    assert_eq!(h.sends_to(x), 0);
    assert!(h.net.calls().contains(&TransportCall::Close {
        connection: x,
        reason: EndReason::INVALID,
        debug: String::new(),
        linger: false,
    }));
}

#[test]
fn test_failed_poll_group_assignment_drops_connection() {
    let mut h = Harness::start();
    h.net.fail_poll_group_assignment(true);

    let x = h.admit("a");

    assert!(h.server.table().is_empty());
    assert_eq!(h.net.connection_state(x), None);
}

// ── Fatal errors ──────────────────────────────────────────────────────────────

#[test]
fn test_listen_failure_is_fatal() {
    let net = InMemoryTransport::new();
    net.fail_listen(true);

    let result = ChatServer::start(
        net,
        ServerSettings::default(),
        PendingInput::new(),
        ShutdownSignal::new(),
    );

    assert!(matches!(result, Err(ServerError::Listen { .. })));
}

#[test]
fn test_poll_group_failure_is_fatal_and_closes_listener() {
    let net = InMemoryTransport::new();
    net.fail_poll_group_creation(true);

    let result = ChatServer::start(
        net.clone(),
        ServerSettings::default(),
        PendingInput::new(),
        ShutdownSignal::new(),
    );

    assert!(matches!(result, Err(ServerError::PollGroup(_))));
    assert_eq!(net.open_listen_sockets(), 0);
}

#[tokio::test]
async fn test_receive_failure_ends_run_with_error() {
    let mut h = Harness::start();
    h.net.fail_receive(true);

    let result = h.server.run().await;

    assert!(matches!(result, Err(ServerError::Receive(_))));
}

// ── Table invariant ───────────────────────────────────────────────────────────

#[test]
fn test_table_tracks_exactly_the_live_connections() {
    // Arrange: a mix of connects and closes in interleaved order
    let mut h = Harness::start();
    let a = h.admit("a");
    let b = h.admit("b");
    let c = h.net.connect("c");
    h.net.close_by_peer(a, EndReason::REMOTE_GENERIC, "");
    let d = h.net.connect("d");
    h.settle();
    h.net.report_local_problem(d, "reset");
    let e = h.admit("e");

    // Act
    h.settle();

    // Assert
    assert_eq!(h.server.table().handles(), vec![b, c, e]);
    assert_eq!(h.net.pending_status_changes(), 0);
}

#[test]
fn test_idle_poll_changes_nothing() {
    let mut h = Harness::start();
    let x = h.admit("a");
    let calls_before = h.net.calls().len();

    h.settle();

    assert_eq!(h.server.table().handles(), vec![x]);
    assert_eq!(h.net.calls().len(), calls_before);
}
