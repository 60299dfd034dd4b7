//! TCP implementation of the message-oriented transport.
//!
//! # Threads
//!
//! ```text
//! acceptor thread (one per listen socket)
//!   non-blocking accept, polled every 50 ms
//!   └─ new stream ──► handle #n, state Connecting, queue None → Connecting
//!                     spawn reader and writer threads for #n
//!
//! reader thread (one per connection)
//!   read_frame() in a loop
//!   ├─ Data(bytes)      ──► inbound queue
//!   ├─ Close{reason}    ──► queue <state> → ClosedByPeer (peer's reason)
//!   ├─ EOF / reset      ──► queue <state> → ClosedByPeer (REMOTE_GENERIC)
//!   └─ any other error  ──► queue <state> → ProblemDetectedLocally (LOCAL_GENERIC)
//!
//! writer thread (one per connection)
//!   drains a bounded outbound queue of pre-encoded frames
//!   ├─ write error / timeout ──► queue <state> → ProblemDetectedLocally
//!   └─ Close frame           ──► write it, shut the stream down, stop
//! ```
//!
//! The application thread only touches the shared state through the
//! [`Transport`] methods, and those never block on a socket: `Accepted`,
//! `Data` and `Close` frames are encoded on the calling thread and handed to
//! the connection's writer with a non-blocking `try_send`.
//!
//! # Delivery classes
//!
//! TCP delivers every queued payload reliably and in order.  The class only
//! matters when the outbound queue is full: an unreliable payload is dropped,
//! a reliable one ends the connection with `ProblemDetectedLocally`.
//!
//! A peer that stops reading first fills its socket buffer, then its queue.
//! Its writer gives up after [`WRITE_TIMEOUT`] and the connection ends; a
//! frame cut short by the timeout is never followed by another one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use chat_core::{
    encode_frame, read_frame, ConnectionHandle, ConnectionInfo, ConnectionState, DeliveryClass,
    EndReason, Frame, IncomingMessage, ListenSocket, PollGroup, StatusChange,
};
use tracing::{debug, info, trace, warn};

use crate::application::transport::{Transport, TransportError};

/// How long an acceptor sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on a single write by a connection's writer thread.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Frames a connection may have waiting for its writer.
pub const OUTBOUND_QUEUE_FRAMES: usize = 64;

struct Listener {
    addr: SocketAddr,
    open: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// One encoded frame on its way to the writer thread.
enum Outgoing {
    /// `Accepted`; never discarded.
    Control(Vec<u8>),
    /// An application payload; discarded once a non-lingering close is
    /// requested.
    Data(Vec<u8>),
    /// The final frame.  The writer shuts the stream down after it.
    Close { bytes: Vec<u8>, linger: bool },
}

struct TcpConnection {
    description: String,
    state: ConnectionState,
    poll_group: Option<PollGroup>,
    next_message_number: u64,
    outbound: SyncSender<Outgoing>,
    discard_pending: Arc<AtomicBool>,
    stream: TcpStream,
}

#[derive(Default)]
struct TcpState {
    next_id: u32,
    listeners: HashMap<ListenSocket, Listener>,
    poll_groups: HashSet<PollGroup>,
    connections: HashMap<ConnectionHandle, TcpConnection>,
    status_changes: VecDeque<StatusChange>,
    inbound: VecDeque<IncomingMessage>,
}

impl TcpState {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn queue_change(
        &mut self,
        handle: ConnectionHandle,
        old_state: ConnectionState,
        description: String,
        new_state: ConnectionState,
        end_reason: EndReason,
        end_debug: String,
    ) {
        self.status_changes.push_back(StatusChange {
            connection: handle,
            old_state,
            info: ConnectionInfo {
                description,
                state: new_state,
                end_reason,
                end_debug,
            },
        });
    }

    /// Moves a live connection into a terminal state reported by its reader.
    /// Connections the application already closed are left alone.
    fn end_connection(
        &mut self,
        handle: ConnectionHandle,
        new_state: ConnectionState,
        reason: EndReason,
        debug: String,
    ) {
        let Some(conn) = self.connections.get_mut(&handle) else {
            return;
        };
        if !conn.state.is_live() {
            return;
        }
        let old_state = conn.state;
        conn.state = new_state;
        let description = conn.description.clone();
        self.queue_change(handle, old_state, description, new_state, reason, debug);
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<TcpState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TcpState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`Transport`] over plain TCP using the `chat_core::protocol` framing.
#[derive(Default)]
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops every acceptor and closes every remaining connection without
    /// further status changes.
    pub fn shutdown(&self) {
        let (listeners, connections) = {
            let mut state = self.shared.lock();
            state.status_changes.clear();
            state.inbound.clear();
            (
                state.listeners.drain().map(|(_, l)| l).collect::<Vec<_>>(),
                state.connections.drain().map(|(_, c)| c).collect::<Vec<_>>(),
            )
        };
        for conn in connections {
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        for listener in listeners {
            stop_listener(listener);
        }
        debug!("tcp transport shut down");
    }

    fn lock(&self) -> MutexGuard<'_, TcpState> {
        self.shared.lock()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Transport for TcpTransport {
    fn create_listen_socket(&self, addr: SocketAddr) -> Result<ListenSocket, TransportError> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?;

        let open = Arc::new(AtomicBool::new(true));
        let socket = ListenSocket(self.lock().allocate_id());
        let shared = Arc::clone(&self.shared);
        let thread_open = Arc::clone(&open);
        let thread = std::thread::Builder::new()
            .name(format!("chat-accept-{}", socket.0))
            .spawn(move || accept_loop(listener, shared, thread_open))?;

        self.lock().listeners.insert(
            socket,
            Listener {
                addr: bound,
                open,
                thread: Some(thread),
            },
        );
        debug!("listening on {bound}");
        Ok(socket)
    }

    fn listen_addr(&self, socket: ListenSocket) -> Option<SocketAddr> {
        self.lock().listeners.get(&socket).map(|l| l.addr)
    }

    fn close_listen_socket(&self, socket: ListenSocket) -> bool {
        // The acceptor takes the lock to register streams; join it unlocked.
        let listener = self.lock().listeners.remove(&socket);
        match listener {
            Some(listener) => {
                stop_listener(listener);
                true
            }
            None => false,
        }
    }

    fn create_poll_group(&self) -> Result<PollGroup, TransportError> {
        let mut state = self.lock();
        let group = PollGroup(state.allocate_id());
        state.poll_groups.insert(group);
        Ok(group)
    }

    fn destroy_poll_group(&self, group: PollGroup) -> bool {
        let mut state = self.lock();
        for conn in state.connections.values_mut() {
            if conn.poll_group == Some(group) {
                conn.poll_group = None;
            }
        }
        state.poll_groups.remove(&group)
    }

    fn drain_status_changes(&self) -> Vec<StatusChange> {
        self.lock().status_changes.drain(..).collect()
    }

    fn accept_connection(&self, handle: ConnectionHandle) -> Result<(), TransportError> {
        let mut state = self.lock();
        let conn = state
            .connections
            .get_mut(&handle)
            .ok_or(TransportError::InvalidConnection(handle))?;
        if conn.state != ConnectionState::Connecting {
            return Err(TransportError::InvalidState {
                connection: handle,
                state: conn.state,
            });
        }

        // Queued under the lock so the frame precedes any data sent after
        // the state change.
        let bytes = encode_frame(&Frame::Accepted)?;
        conn.outbound
            .try_send(Outgoing::Control(bytes))
            .map_err(|_| TransportError::WriterStopped(handle))?;
        conn.state = ConnectionState::Connected;
        let description = conn.description.clone();
        state.queue_change(
            handle,
            ConnectionState::Connecting,
            description,
            ConnectionState::Connected,
            EndReason::INVALID,
            String::new(),
        );
        Ok(())
    }

    fn close_connection(
        &self,
        handle: ConnectionHandle,
        reason: EndReason,
        debug: &str,
        linger: bool,
    ) -> bool {
        let conn = {
            let mut state = self.lock();
            let Some(conn) = state.connections.remove(&handle) else {
                return false;
            };
            state.inbound.retain(|m| m.connection() != handle);
            state.queue_change(
                handle,
                conn.state,
                conn.description.clone(),
                ConnectionState::None,
                reason,
                debug.to_string(),
            );
            conn
        };

        if !linger {
            conn.discard_pending.store(true, Ordering::SeqCst);
        }
        let close = Frame::Close {
            reason: reason.code(),
            debug: debug.to_string(),
        };
        let queued = encode_frame(&close)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                conn.outbound
                    .try_send(Outgoing::Close { bytes, linger })
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = queued {
            // No room for a goodbye; release the socket right away.
            trace!(connection = %handle, "close frame not queued: {e}");
            if let Err(e) = conn.stream.shutdown(Shutdown::Both) {
                trace!(connection = %handle, "shutdown failed: {e}");
            }
        }
        true
    }

    fn set_connection_poll_group(
        &self,
        handle: ConnectionHandle,
        group: PollGroup,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.poll_groups.contains(&group) {
            return Err(TransportError::InvalidPollGroup(group));
        }
        let conn = state
            .connections
            .get_mut(&handle)
            .ok_or(TransportError::InvalidConnection(handle))?;
        conn.poll_group = Some(group);
        Ok(())
    }

    fn send_message_to_connection(
        &self,
        handle: ConnectionHandle,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<(), TransportError> {
        let bytes = encode_frame(&Frame::Data(payload.to_vec()))?;
        let mut state = self.lock();
        let queued = {
            let conn = state
                .connections
                .get(&handle)
                .ok_or(TransportError::InvalidConnection(handle))?;
            if conn.state != ConnectionState::Connected {
                return Err(TransportError::InvalidState {
                    connection: handle,
                    state: conn.state,
                });
            }
            conn.outbound.try_send(Outgoing::Data(bytes))
        };
        match queued {
            Ok(()) => {
                trace!(connection = %handle, ?class, len = payload.len(), "send queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) if !class.is_reliable() => {
                trace!(connection = %handle, ?class, "outbound queue full, payload dropped");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                state.end_connection(
                    handle,
                    ConnectionState::ProblemDetectedLocally,
                    EndReason::LOCAL_GENERIC,
                    "outbound queue full".to_string(),
                );
                Err(TransportError::QueueFull(handle))
            }
            Err(TrySendError::Disconnected(_)) => Err(TransportError::WriterStopped(handle)),
        }
    }

    fn receive_messages_on_poll_group(
        &self,
        group: PollGroup,
        max_messages: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.poll_groups.contains(&group) {
            return Err(TransportError::InvalidPollGroup(group));
        }

        let mut out = Vec::new();
        let mut i = 0;
        while i < state.inbound.len() && out.len() < max_messages {
            let in_group = state
                .connections
                .get(&state.inbound[i].connection())
                .is_some_and(|c| c.poll_group == Some(group));
            if in_group {
                if let Some(message) = state.inbound.remove(i) {
                    out.push(message);
                }
            } else {
                i += 1;
            }
        }
        Ok(out)
    }
}

fn stop_listener(mut listener: Listener) {
    listener.open.store(false, Ordering::SeqCst);
    if let Some(thread) = listener.thread.take() {
        if thread.join().is_err() {
            warn!("acceptor for {} panicked", listener.addr);
        }
    }
}

// ── Background threads ────────────────────────────────────────────────────────

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, open: Arc<AtomicBool>) {
    while open.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = register_stream(&shared, stream, peer) {
                    warn!("failed to set up connection from {peer}: {e}");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!("accept failed: {e}");
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!("acceptor stopped");
}

/// Tracks a freshly accepted stream as `Connecting` and starts its reader
/// and writer.
fn register_stream(
    shared: &Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let reader = stream.try_clone()?;
    let writer = stream.try_clone()?;
    let (outbound, frames) = mpsc::sync_channel(OUTBOUND_QUEUE_FRAMES);
    let discard_pending = Arc::new(AtomicBool::new(false));
    let writer_discard = Arc::clone(&discard_pending);

    let handle = {
        let mut state = shared.lock();
        let handle = ConnectionHandle(state.allocate_id());
        let description = format!("{handle} {peer}");
        state.connections.insert(
            handle,
            TcpConnection {
                description: description.clone(),
                state: ConnectionState::Connecting,
                poll_group: None,
                next_message_number: 1,
                outbound,
                discard_pending,
                stream,
            },
        );
        state.queue_change(
            handle,
            ConnectionState::None,
            description,
            ConnectionState::Connecting,
            EndReason::INVALID,
            String::new(),
        );
        handle
    };
    info!(connection = %handle, "incoming connection from {peer}");

    let writer_shared = Arc::clone(shared);
    let spawned = std::thread::Builder::new()
        .name(format!("chat-write-{}", handle.0))
        .spawn(move || write_loop(handle, writer, frames, writer_discard, writer_shared))
        .and_then(|_| {
            let reader_shared = Arc::clone(shared);
            std::thread::Builder::new()
                .name(format!("chat-conn-{}", handle.0))
                .spawn(move || read_loop(handle, reader, reader_shared))
        });
    if let Err(e) = spawned {
        shared.lock().end_connection(
            handle,
            ConnectionState::ProblemDetectedLocally,
            EndReason::MISC_INTERNAL_ERROR,
            format!("failed to start connection threads: {e}"),
        );
        return Err(e);
    }
    Ok(())
}

/// Writes queued frames until the queue closes, a close frame goes out, or a
/// write fails.
fn write_loop(
    handle: ConnectionHandle,
    mut stream: TcpStream,
    frames: Receiver<Outgoing>,
    discard_pending: Arc<AtomicBool>,
    shared: Arc<Shared>,
) {
    while let Ok(item) = frames.recv() {
        let bytes = match item {
            Outgoing::Control(bytes) => bytes,
            Outgoing::Data(_) if discard_pending.load(Ordering::SeqCst) => continue,
            Outgoing::Data(bytes) => bytes,
            Outgoing::Close { bytes, linger } => {
                if let Err(e) = stream.write_all(&bytes).and_then(|()| stream.flush()) {
                    trace!(connection = %handle, "close frame not delivered: {e}");
                }
                let how = if linger { Shutdown::Write } else { Shutdown::Both };
                if let Err(e) = stream.shutdown(how) {
                    trace!(connection = %handle, "shutdown failed: {e}");
                }
                return;
            }
        };
        if let Err(e) = stream.write_all(&bytes).and_then(|()| stream.flush()) {
            debug!(connection = %handle, "write failed: {e}");
            shared.lock().end_connection(
                handle,
                ConnectionState::ProblemDetectedLocally,
                EndReason::LOCAL_GENERIC,
                format!("write failed: {e}"),
            );
            // A partial frame may be on the wire; nothing may follow it.
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    }
}

fn read_loop(handle: ConnectionHandle, stream: TcpStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame(&mut reader) {
            Ok(Frame::Data(payload)) => {
                let mut guard = shared.lock();
                let state = &mut *guard;
                let Some(conn) = state.connections.get_mut(&handle) else {
                    // Closed by the application; nothing left to deliver to.
                    return;
                };
                let number = conn.next_message_number;
                conn.next_message_number += 1;
                state
                    .inbound
                    .push_back(IncomingMessage::new(handle, number, payload));
            }
            Ok(Frame::Close { reason, debug }) => {
                shared.lock().end_connection(
                    handle,
                    ConnectionState::ClosedByPeer,
                    EndReason(reason),
                    debug,
                );
                return;
            }
            Ok(Frame::Accepted) => {
                debug!(connection = %handle, "ignoring unexpected Accepted frame from client");
            }
            Err(e) if e.is_disconnect() => {
                shared.lock().end_connection(
                    handle,
                    ConnectionState::ClosedByPeer,
                    EndReason::REMOTE_GENERIC,
                    "connection closed by peer".to_string(),
                );
                return;
            }
            Err(e) => {
                shared.lock().end_connection(
                    handle,
                    ConnectionState::ProblemDetectedLocally,
                    EndReason::LOCAL_GENERIC,
                    e.to_string(),
                );
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
