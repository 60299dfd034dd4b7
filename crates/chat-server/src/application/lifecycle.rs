//! Connection lifecycle state machine.
//!
//! Consumes the [`StatusChange`] notifications a transport queues and turns
//! them into accept/close decisions and [`ConnectionTable`] updates:
//!
//! ```text
//! None ──► Connecting ──► Connected ──► ClosedByPeer ───────────┐
//!              │                   └──► ProblemDetectedLocally ─┤
//!              │                                                ▼
//!              └──────────(peer gave up before accept)──────► destroyed
//! ```
//!
//! | New state                | Action                                          |
//! |--------------------------|-------------------------------------------------|
//! | `Connecting`             | track, accept, join the poll group              |
//! | `Connected`              | nothing (already tracked since `Connecting`)    |
//! | `ClosedByPeer`           | stop tracking, release the transport resources  |
//! | `ProblemDetectedLocally` | stop tracking, release the transport resources  |
//! | `None`                   | nothing (the server's own close, reported back) |
//!
//! A failed accept or poll-group assignment affects only that connection: it
//! is closed right away and never becomes visible to the message relay.

use chat_core::{ConnectionState, EndReason, PollGroup, StatusChange};
use tracing::{debug, error, info, warn};

use super::connection_table::{ClientRecord, ConnectionTable};
use super::transport::Transport;

/// What [`handle_status_change`] did with one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The connection was accepted, tracked, and joined the poll group.
    Admitted,
    /// The transport refused the accept; the connection was closed.
    AcceptFailed,
    /// The connection could not join the poll group; it was closed.
    PollGroupFailed,
    /// The connection finished connecting; nothing to do.
    Acknowledged,
    /// The connection ended and was released.
    Removed { was_connected: bool },
    /// The notification required no action.
    Ignored,
}

/// Applies one status change to `table`, calling into `transport` as needed.
pub fn handle_status_change<T: Transport + ?Sized>(
    transport: &T,
    table: &mut ConnectionTable,
    poll_group: PollGroup,
    change: &StatusChange,
) -> LifecycleOutcome {
    match change.new_state() {
        ConnectionState::Connecting => on_connecting(transport, table, poll_group, change),
        ConnectionState::Connected => {
            debug!(connection = %change.connection, "connection established");
            LifecycleOutcome::Acknowledged
        }
        ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally => {
            on_terminal(transport, table, change)
        }
        ConnectionState::None => LifecycleOutcome::Ignored,
    }
}

/// Handles every status change the transport has queued, oldest first.
///
/// Returns one outcome per change; an empty vector when nothing was pending.
pub fn drain<T: Transport + ?Sized>(
    transport: &T,
    table: &mut ConnectionTable,
    poll_group: PollGroup,
) -> Vec<LifecycleOutcome> {
    transport
        .drain_status_changes()
        .iter()
        .map(|change| handle_status_change(transport, table, poll_group, change))
        .collect()
}

fn on_connecting<T: Transport + ?Sized>(
    transport: &T,
    table: &mut ConnectionTable,
    poll_group: PollGroup,
    change: &StatusChange,
) -> LifecycleOutcome {
    let handle = change.connection;
    let description = &change.info.description;

    let replaced = table.insert(handle, ClientRecord::new(description.as_str()));
    debug_assert!(replaced.is_none(), "connection {handle} reported Connecting twice");
    if replaced.is_some() {
        error!(connection = %handle, "connection reported Connecting twice; record replaced");
    }

    info!("Connection request from {description}");

    if let Err(e) = transport.accept_connection(handle) {
        transport.close_connection(handle, EndReason::INVALID, "", false);
        table.remove(handle);
        warn!(connection = %handle, "Can't accept connection. (It was already closed?) {e}");
        return LifecycleOutcome::AcceptFailed;
    }

    if let Err(e) = transport.set_connection_poll_group(handle, poll_group) {
        transport.close_connection(handle, EndReason::INVALID, "", false);
        table.remove(handle);
        warn!(connection = %handle, "Failed to set poll group: {e}");
        return LifecycleOutcome::PollGroupFailed;
    }

    LifecycleOutcome::Admitted
}

fn on_terminal<T: Transport + ?Sized>(
    transport: &T,
    table: &mut ConnectionTable,
    change: &StatusChange,
) -> LifecycleOutcome {
    let handle = change.connection;
    let was_connected = change.old_state == ConnectionState::Connected;

    if was_connected {
        let tracked = table.contains(handle);
        debug_assert!(tracked, "connected connection {handle} missing from table");
        if !tracked {
            warn!(connection = %handle, "closed connection was not tracked");
        }
        info!(
            "Connection {} {}, reason {}: {}",
            change.info.description,
            change.new_state(),
            change.info.end_reason,
            change.info.end_debug
        );
    } else {
        debug!(
            connection = %handle,
            old_state = %change.old_state,
            "connection ended before it was established"
        );
    }

    table.remove(handle);
    transport.close_connection(handle, EndReason::INVALID, "", false);
    LifecycleOutcome::Removed { was_connected }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transport::{MockTransport, TransportError};
    use chat_core::{ConnectionHandle, ConnectionInfo};
    use mockall::predicate::eq;

    const GROUP: PollGroup = PollGroup(1);

    fn change(handle: u32, old: ConnectionState, new: ConnectionState) -> StatusChange {
        StatusChange {
            connection: ConnectionHandle(handle),
            old_state: old,
            info: ConnectionInfo::live(format!("#{handle} 127.0.0.1:4000{handle}"), new),
        }
    }

    fn closed(handle: u32, old: ConnectionState, new: ConnectionState) -> StatusChange {
        let mut c = change(handle, old, new);
        c.info.end_reason = EndReason::REMOTE_GENERIC;
        c.info.end_debug = "peer hung up".to_string();
        c
    }

    fn expect_app_close(transport: &mut MockTransport, handle: u32) {
        transport
            .expect_close_connection()
            .withf(move |h, reason, debug, linger| {
                *h == ConnectionHandle(handle)
                    && *reason == EndReason::INVALID
                    && debug.is_empty()
                    && !*linger
            })
            .times(1)
            .returning(|_, _, _, _| true);
    }

    // ── Connecting ────────────────────────────────────────────────────────────

    #[test]
    fn test_connecting_accepts_and_joins_poll_group() {
        // Arrange
        let mut transport = MockTransport::new();
        transport
            .expect_accept_connection()
            .with(eq(ConnectionHandle(1)))
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_set_connection_poll_group()
            .with(eq(ConnectionHandle(1)), eq(GROUP))
            .times(1)
            .returning(|_, _| Ok(()));
        transport.expect_close_connection().never();
        let mut table = ConnectionTable::new();

        // Act
        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &change(1, ConnectionState::None, ConnectionState::Connecting),
        );

        // Assert
        assert_eq!(outcome, LifecycleOutcome::Admitted);
        assert_eq!(
            table.get(ConnectionHandle(1)).map(|r| r.description.as_str()),
            Some("#1 127.0.0.1:40001")
        );
    }

    #[test]
    fn test_accept_failure_closes_and_forgets_connection() {
        // Arrange
        let mut transport = MockTransport::new();
        transport
            .expect_accept_connection()
            .returning(|h| Err(TransportError::InvalidConnection(h)));
        transport.expect_set_connection_poll_group().never();
        expect_app_close(&mut transport, 2);
        let mut table = ConnectionTable::new();

        // Act
        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &change(2, ConnectionState::None, ConnectionState::Connecting),
        );

        // Assert
        assert_eq!(outcome, LifecycleOutcome::AcceptFailed);
        assert!(table.is_empty());
    }

    #[test]
    fn test_poll_group_failure_closes_and_forgets_connection() {
        let mut transport = MockTransport::new();
        transport.expect_accept_connection().returning(|_| Ok(()));
        transport
            .expect_set_connection_poll_group()
            .returning(|_, g| Err(TransportError::InvalidPollGroup(g)));
        expect_app_close(&mut transport, 3);
        let mut table = ConnectionTable::new();

        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &change(3, ConnectionState::None, ConnectionState::Connecting),
        );

        assert_eq!(outcome, LifecycleOutcome::PollGroupFailed);
        assert!(table.is_empty());
    }

    // ── Connected ─────────────────────────────────────────────────────────────

    #[test]
    fn test_connected_makes_no_transport_calls() {
        // Arrange: a MockTransport with no expectations panics on any call
        let transport = MockTransport::new();
        let mut table = ConnectionTable::new();
        table.insert(ConnectionHandle(1), ClientRecord::new("#1"));

        // Act
        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &change(1, ConnectionState::Connecting, ConnectionState::Connected),
        );

        // Assert
        assert_eq!(outcome, LifecycleOutcome::Acknowledged);
        assert!(table.contains(ConnectionHandle(1)));
    }

    // ── Terminal states ───────────────────────────────────────────────────────

    #[test]
    fn test_closed_by_peer_removes_record_and_releases_connection() {
        // Arrange
        let mut transport = MockTransport::new();
        expect_app_close(&mut transport, 1);
        let mut table = ConnectionTable::new();
        table.insert(ConnectionHandle(1), ClientRecord::new("#1"));
        table.insert(ConnectionHandle(2), ClientRecord::new("#2"));

        // Act
        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &closed(1, ConnectionState::Connected, ConnectionState::ClosedByPeer),
        );

        // Assert
        assert_eq!(outcome, LifecycleOutcome::Removed { was_connected: true });
        assert_eq!(table.handles(), vec![ConnectionHandle(2)]);
    }

    #[test]
    fn test_local_problem_removes_record() {
        let mut transport = MockTransport::new();
        expect_app_close(&mut transport, 4);
        let mut table = ConnectionTable::new();
        table.insert(ConnectionHandle(4), ClientRecord::new("#4"));

        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &closed(4, ConnectionState::Connected, ConnectionState::ProblemDetectedLocally),
        );

        assert_eq!(outcome, LifecycleOutcome::Removed { was_connected: true });
        assert!(table.is_empty());
    }

    #[test]
    fn test_close_while_connecting_removes_record() {
        let mut transport = MockTransport::new();
        expect_app_close(&mut transport, 5);
        let mut table = ConnectionTable::new();
        table.insert(ConnectionHandle(5), ClientRecord::new("#5"));

        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &closed(5, ConnectionState::Connecting, ConnectionState::ClosedByPeer),
        );

        assert_eq!(outcome, LifecycleOutcome::Removed { was_connected: false });
        assert!(table.is_empty());
    }

    #[test]
    fn test_none_state_is_ignored() {
        let transport = MockTransport::new();
        let mut table = ConnectionTable::new();

        let outcome = handle_status_change(
            &transport,
            &mut table,
            GROUP,
            &change(6, ConnectionState::ClosedByPeer, ConnectionState::None),
        );

        assert_eq!(outcome, LifecycleOutcome::Ignored);
        assert!(table.is_empty());
    }

    // ── drain ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_drain_with_nothing_pending_is_a_no_op() {
        let mut transport = MockTransport::new();
        transport
            .expect_drain_status_changes()
            .times(1)
            .returning(Vec::new);
        let mut table = ConnectionTable::new();

        let outcomes = drain(&transport, &mut table, GROUP);

        assert!(outcomes.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_handles_changes_in_order() {
        // Arrange: connect, establish, then close the same connection
        let mut transport = MockTransport::new();
        transport.expect_drain_status_changes().times(1).returning(|| {
            vec![
                change(1, ConnectionState::None, ConnectionState::Connecting),
                change(1, ConnectionState::Connecting, ConnectionState::Connected),
                closed(1, ConnectionState::Connected, ConnectionState::ClosedByPeer),
            ]
        });
        transport.expect_accept_connection().returning(|_| Ok(()));
        transport
            .expect_set_connection_poll_group()
            .returning(|_, _| Ok(()));
        expect_app_close(&mut transport, 1);
        let mut table = ConnectionTable::new();

        // Act
        let outcomes = drain(&transport, &mut table, GROUP);

        // Assert
        assert_eq!(
            outcomes,
            vec![
                LifecycleOutcome::Admitted,
                LifecycleOutcome::Acknowledged,
                LifecycleOutcome::Removed { was_connected: true },
            ]
        );
        assert!(table.is_empty());
    }
}
