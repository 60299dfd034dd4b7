//! Delivery-class hints attached to outbound sends.

/// Reliability/latency trade-off requested for a single send.
///
/// A transport may deliver *more* reliably than requested but never less.
/// The TCP transport delivers in order and drops an unreliable send only when
/// the connection's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryClass {
    /// May be dropped; may be delayed briefly to coalesce with other sends.
    Unreliable,
    /// May be dropped; flushed immediately instead of being coalesced.
    UnreliableNoNagle,
    /// May be dropped; discarded instead of queued if it cannot go out now.
    /// This is the lowest-latency class.
    UnreliableNoDelay,
    /// Guaranteed, in order; may be coalesced.
    Reliable,
    /// Guaranteed, in order; flushed immediately.
    ReliableNoNagle,
}

impl DeliveryClass {
    pub fn is_reliable(self) -> bool {
        matches!(self, DeliveryClass::Reliable | DeliveryClass::ReliableNoNagle)
    }
}
