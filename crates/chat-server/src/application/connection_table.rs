//! Connection table: the server's registry of live clients.
//!
//! A handle is present in the table exactly while the connection is live from
//! the server's point of view, that is from the moment the transport reports
//! `Connecting` until the lifecycle state machine observes a terminal state
//! (or the server shuts down).  Only the lifecycle state machine and the
//! shutdown sequence mutate the table; the message relay only reads it.
//!
//! # HashMap choice
//!
//! A `HashMap<ConnectionHandle, ClientRecord>` gives O(1) lookup of the sender
//! of every inbound message.  Iteration order is not guaranteed, and nothing
//! depends on it: a broadcast reaches every recipient regardless of order.

use std::collections::HashMap;

use chat_core::ConnectionHandle;

/// Per-connection application state.
///
/// Today it only remembers how the transport described the peer when it
/// connected; this is where a nickname or similar metadata would live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub description: String,
}

impl ClientRecord {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Registry of live connections.  Owned by the event loop thread.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    clients: HashMap<ConnectionHandle, ClientRecord>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `handle`, returning the record it replaced, if any.
    pub fn insert(&mut self, handle: ConnectionHandle, record: ClientRecord) -> Option<ClientRecord> {
        self.clients.insert(handle, record)
    }

    /// Stops tracking `handle`, returning its record if it was present.
    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<ClientRecord> {
        self.clients.remove(&handle)
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<&ClientRecord> {
        self.clients.get(&handle)
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.clients.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Snapshot of every tracked handle, in ascending handle order.
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<ConnectionHandle> = self.clients.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Snapshot of every tracked handle except `excluded`.
    pub fn handles_except(&self, excluded: Option<ConnectionHandle>) -> Vec<ConnectionHandle> {
        let mut handles = self.handles();
        if let Some(excluded) = excluded {
            handles.retain(|h| *h != excluded);
        }
        handles
    }

    /// Removes every entry, returning them in ascending handle order.
    pub fn drain(&mut self) -> Vec<(ConnectionHandle, ClientRecord)> {
        let mut entries: Vec<_> = self.clients.drain().collect();
        entries.sort_unstable_by_key(|(handle, _)| *handle);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(handles: &[u32]) -> ConnectionTable {
        let mut table = ConnectionTable::new();
        for &h in handles {
            table.insert(ConnectionHandle(h), ClientRecord::new(format!("#{h} test")));
        }
        table
    }

    #[test]
    fn test_table_starts_empty() {
        let table = ConnectionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_insert_adds_client() {
        // Arrange
        let mut table = ConnectionTable::new();

        // Act
        let previous = table.insert(ConnectionHandle(1), ClientRecord::new("#1 10.0.0.1:5000"));

        // Assert
        assert!(previous.is_none());
        assert!(table.contains(ConnectionHandle(1)));
        assert_eq!(
            table.get(ConnectionHandle(1)).map(|r| r.description.as_str()),
            Some("#1 10.0.0.1:5000")
        );
    }

    #[test]
    fn test_insert_existing_handle_returns_replaced_record() {
        let mut table = table_with(&[1]);
        let previous = table.insert(ConnectionHandle(1), ClientRecord::new("replacement"));
        assert_eq!(previous, Some(ClientRecord::new("#1 test")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_deletes_client() {
        let mut table = table_with(&[1, 2]);
        let removed = table.remove(ConnectionHandle(1));
        assert!(removed.is_some());
        assert!(!table.contains(ConnectionHandle(1)));
        assert!(table.contains(ConnectionHandle(2)));
    }

    #[test]
    fn test_remove_unknown_handle_is_none() {
        let mut table = table_with(&[1]);
        assert!(table.remove(ConnectionHandle(9)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_handles_except_skips_excluded_handle() {
        let table = table_with(&[3, 1, 2]);
        assert_eq!(
            table.handles_except(Some(ConnectionHandle(2))),
            vec![ConnectionHandle(1), ConnectionHandle(3)]
        );
        assert_eq!(table.handles_except(None).len(), 3);
    }

    #[test]
    fn test_drain_empties_table() {
        // Arrange
        let mut table = table_with(&[2, 1]);

        // Act
        let drained = table.drain();

        // Assert
        assert!(table.is_empty());
        let handles: Vec<_> = drained.into_iter().map(|(h, _)| h).collect();
        assert_eq!(handles, vec![ConnectionHandle(1), ConnectionHandle(2)]);
    }
}
