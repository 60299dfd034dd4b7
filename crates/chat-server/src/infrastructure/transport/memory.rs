//! Scripted in-memory transport.
//!
//! Allows tests to drive the server through complete connection lifecycles
//! without opening a socket.  The test plays the role of the network:
//!
//! ```text
//! test                              InMemoryTransport                 server
//! ────                              ─────────────────                 ──────
//! connect("#1 peer")        ──►     queue None → Connecting    ──►    drain_status_changes
//!                                   Connecting → Connected     ◄──    accept_connection
//! deliver(#1, b"hi")        ──►     inbound message            ──►    receive_messages_on_poll_group
//! sent_to(#2)               ◄──     recorded send              ◄──    send_message_to_connection
//! ```
//!
//! Cloning is cheap and every clone shares the same state, so a test keeps
//! one clone for scripting while the server owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{
    ConnectionHandle, ConnectionInfo, ConnectionState, DeliveryClass, EndReason, IncomingMessage,
    ListenSocket, PollGroup, StatusChange,
};

use crate::application::transport::{Transport, TransportError};

/// One state-changing call the application made, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateListenSocket(SocketAddr),
    CloseListenSocket(ListenSocket),
    CreatePollGroup,
    DestroyPollGroup(PollGroup),
    Accept(ConnectionHandle),
    SetPollGroup(ConnectionHandle, PollGroup),
    Send {
        connection: ConnectionHandle,
        payload: Vec<u8>,
        class: DeliveryClass,
    },
    Close {
        connection: ConnectionHandle,
        reason: EndReason,
        debug: String,
        linger: bool,
    },
}

/// A payload the transport accepted for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub connection: ConnectionHandle,
    pub payload: Vec<u8>,
    pub class: DeliveryClass,
}

#[derive(Debug, Default)]
struct Failures {
    listen: bool,
    create_poll_group: bool,
    accept: bool,
    set_poll_group: bool,
    receive: bool,
}

#[derive(Debug)]
struct MemoryConnection {
    description: String,
    state: ConnectionState,
    poll_group: Option<PollGroup>,
    next_message_number: u64,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    listen_sockets: HashMap<ListenSocket, SocketAddr>,
    poll_groups: HashSet<PollGroup>,
    connections: HashMap<ConnectionHandle, MemoryConnection>,
    status_changes: VecDeque<StatusChange>,
    inbound: VecDeque<IncomingMessage>,
    sent: Vec<SentMessage>,
    calls: Vec<TransportCall>,
    failures: Failures,
}

impl State {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Moves `handle` to `new_state` and queues the matching status change.
    fn transition(
        &mut self,
        handle: ConnectionHandle,
        new_state: ConnectionState,
        end_reason: EndReason,
        end_debug: &str,
    ) {
        if let Some(conn) = self.connections.get_mut(&handle) {
            let old_state = conn.state;
            conn.state = new_state;
            self.status_changes.push_back(StatusChange {
                connection: handle,
                old_state,
                info: ConnectionInfo {
                    description: conn.description.clone(),
                    state: new_state,
                    end_reason,
                    end_debug: end_debug.to_string(),
                },
            });
        }
    }
}

/// A [`Transport`] whose "network" is driven by the caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting the network ─────────────────────────────────────────────────

    /// Simulates a peer asking to connect.  Queues `None → Connecting`.
    pub fn connect(&self, peer: &str) -> ConnectionHandle {
        let mut state = self.lock();
        let handle = ConnectionHandle(state.allocate_id());
        state.connections.insert(
            handle,
            MemoryConnection {
                description: format!("{handle} {peer}"),
                state: ConnectionState::None,
                poll_group: None,
                next_message_number: 1,
            },
        );
        state.transition(handle, ConnectionState::Connecting, EndReason::INVALID, "");
        handle
    }

    /// Simulates `handle`'s peer sending `payload`.
    ///
    /// Returns `false` if the transport no longer knows the connection.
    pub fn deliver(&self, handle: ConnectionHandle, payload: &[u8]) -> bool {
        let mut state = self.lock();
        let Some(conn) = state.connections.get_mut(&handle) else {
            return false;
        };
        let number = conn.next_message_number;
        conn.next_message_number += 1;
        state
            .inbound
            .push_back(IncomingMessage::new(handle, number, payload.to_vec()));
        true
    }

    /// Simulates the peer closing the connection.  Queues `<old> → ClosedByPeer`.
    pub fn close_by_peer(&self, handle: ConnectionHandle, reason: EndReason, debug: &str) {
        self.lock()
            .transition(handle, ConnectionState::ClosedByPeer, reason, debug);
    }

    /// Simulates a local failure (timeout, I/O error) on the connection.
    pub fn report_local_problem(&self, handle: ConnectionHandle, debug: &str) {
        self.lock().transition(
            handle,
            ConnectionState::ProblemDetectedLocally,
            EndReason::LOCAL_GENERIC,
            debug,
        );
    }

    // ── Failure injection ─────────────────────────────────────────────────────

    pub fn fail_listen(&self, fail: bool) {
        self.lock().failures.listen = fail;
    }

    pub fn fail_poll_group_creation(&self, fail: bool) {
        self.lock().failures.create_poll_group = fail;
    }

    /// Makes `accept_connection` fail as if the peer had already gone away.
    pub fn fail_accepts(&self, fail: bool) {
        self.lock().failures.accept = fail;
    }

    pub fn fail_poll_group_assignment(&self, fail: bool) {
        self.lock().failures.set_poll_group = fail;
    }

    pub fn fail_receive(&self, fail: bool) {
        self.lock().failures.receive = fail;
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// Every state-changing call made so far, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Every payload accepted for delivery, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Payloads accepted for delivery to `handle`, oldest first.
    pub fn sent_to(&self, handle: ConnectionHandle) -> Vec<Vec<u8>> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.connection == handle)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Current state of `handle`, or `None` once the application closed it.
    pub fn connection_state(&self, handle: ConnectionHandle) -> Option<ConnectionState> {
        self.lock().connections.get(&handle).map(|c| c.state)
    }

    pub fn open_listen_sockets(&self) -> usize {
        self.lock().listen_sockets.len()
    }

    pub fn open_poll_groups(&self) -> usize {
        self.lock().poll_groups.len()
    }

    /// Status changes queued but not yet drained.
    pub fn pending_status_changes(&self) -> usize {
        self.lock().status_changes.len()
    }
}

impl Transport for InMemoryTransport {
    fn create_listen_socket(&self, addr: SocketAddr) -> Result<ListenSocket, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::CreateListenSocket(addr));
        if state.failures.listen {
            return Err(TransportError::Bind {
                addr,
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "scripted failure"),
            });
        }
        let socket = ListenSocket(state.allocate_id());
        state.listen_sockets.insert(socket, addr);
        Ok(socket)
    }

    fn listen_addr(&self, socket: ListenSocket) -> Option<SocketAddr> {
        self.lock().listen_sockets.get(&socket).copied()
    }

    fn close_listen_socket(&self, socket: ListenSocket) -> bool {
        let mut state = self.lock();
        state.calls.push(TransportCall::CloseListenSocket(socket));
        state.listen_sockets.remove(&socket).is_some()
    }

    fn create_poll_group(&self) -> Result<PollGroup, TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::CreatePollGroup);
        if state.failures.create_poll_group {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted failure",
            )));
        }
        let group = PollGroup(state.allocate_id());
        state.poll_groups.insert(group);
        Ok(group)
    }

    fn destroy_poll_group(&self, group: PollGroup) -> bool {
        let mut state = self.lock();
        state.calls.push(TransportCall::DestroyPollGroup(group));
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
        state.calls.push(TransportCall::Accept(handle));
        let current = state
            .connections
            .get(&handle)
            .map(|c| c.state)
            .ok_or(TransportError::InvalidConnection(handle))?;
        if state.failures.accept || current != ConnectionState::Connecting {
            return Err(TransportError::InvalidState {
                connection: handle,
                state: current,
            });
        }
        state.transition(handle, ConnectionState::Connected, EndReason::INVALID, "");
        Ok(())
    }

    fn close_connection(
        &self,
        handle: ConnectionHandle,
        reason: EndReason,
        debug: &str,
        linger: bool,
    ) -> bool {
        let mut state = self.lock();
        state.calls.push(TransportCall::Close {
            connection: handle,
            reason,
            debug: debug.to_string(),
            linger,
        });
        if !state.connections.contains_key(&handle) {
            return false;
        }
        state.transition(handle, ConnectionState::None, reason, debug);
        state.connections.remove(&handle);
        state.inbound.retain(|m| m.connection() != handle);
        true
    }

    fn set_connection_poll_group(
        &self,
        handle: ConnectionHandle,
        group: PollGroup,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(TransportCall::SetPollGroup(handle, group));
        if state.failures.set_poll_group || !state.poll_groups.contains(&group) {
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
        let mut state = self.lock();
        state.calls.push(TransportCall::Send {
            connection: handle,
            payload: payload.to_vec(),
            class,
        });
        let current = state
            .connections
            .get(&handle)
            .map(|c| c.state)
            .ok_or(TransportError::InvalidConnection(handle))?;
        if !current.is_live() {
            return Err(TransportError::InvalidState {
                connection: handle,
                state: current,
            });
        }
        state.sent.push(SentMessage {
            connection: handle,
            payload: payload.to_vec(),
            class,
        });
        Ok(())
    }

    fn receive_messages_on_poll_group(
        &self,
        group: PollGroup,
        max_messages: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.failures.receive {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted failure",
            )));
        }
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

// ── Tests ─────────────────────────────────────────────────────────────────────
