//! Message relay: fan every inbound payload out to every other client.
//!
//! The relay never interprets payloads.  The bytes a client sends are the
//! bytes every other client receives; decoding to text happens only for the
//! log line.  Messages are pulled from the poll group one at a time so that a
//! shutdown request is noticed between any two messages.

use chat_core::{ConnectionHandle, DeliveryClass, IncomingMessage, PollGroup, ShutdownSignal};
use tracing::debug;

use super::connection_table::ConnectionTable;
use super::transport::{Transport, TransportError};

/// Delivery class used for every relayed payload and for the shutdown notice.
pub const RELAY_DELIVERY: DeliveryClass = DeliveryClass::UnreliableNoDelay;

/// Relays every pending inbound message until the poll group is empty or
/// `shutdown` is set.
///
/// Returns the number of inbound messages processed.
///
/// # Errors
///
/// Returns the transport's error if polling the group fails.  That is fatal
/// for the server; individual send failures are not.
pub fn drain_and_broadcast<T: Transport + ?Sized>(
    transport: &T,
    table: &ConnectionTable,
    poll_group: PollGroup,
    shutdown: &ShutdownSignal,
) -> Result<usize, TransportError> {
    let mut processed = 0;
    while !shutdown.is_triggered() {
        let batch = transport.receive_messages_on_poll_group(poll_group, 1)?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            relay_one(transport, table, message);
            processed += 1;
        }
    }
    Ok(processed)
}

fn relay_one<T: Transport + ?Sized>(transport: &T, table: &ConnectionTable, message: IncomingMessage) {
    let sender = message.connection();
    let message_number = message.message_number();
    if !table.contains(sender) {
        debug!(connection = %sender, "message from untracked connection");
    }

    let payload = message.payload().to_vec();
    message.release();

    debug!(
        connection = %sender,
        message_number,
        "relaying: {}",
        String::from_utf8_lossy(&payload)
    );
    broadcast(transport, table, &payload, Some(sender));
}

/// Sends `payload` to every tracked connection except `except`.
///
/// Returns how many sends the transport accepted.  A failed send is logged
/// and skipped; it never stops the remaining sends.
pub fn broadcast<T: Transport + ?Sized>(
    transport: &T,
    table: &ConnectionTable,
    payload: &[u8],
    except: Option<ConnectionHandle>,
) -> usize {
    let mut delivered = 0;
    for handle in table.handles_except(except) {
        match transport.send_message_to_connection(handle, payload, RELAY_DELIVERY) {
            Ok(()) => delivered += 1,
            Err(e) => debug!(connection = %handle, "send failed: {e}"),
        }
    }
    delivered
}

// ── Tests ─────────────────────────────────────────────────────────────────────
