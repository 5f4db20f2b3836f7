//! # Transport
//!
//! The send primitive the gossip engine hands deltas to. Implementations must
//! not block: a send only queues the delta for delivery and returns.

use murmur_core::error::Result;
use murmur_core::types::{NodeId, Value};

/// Fire-and-forget delivery of deltas to peers
pub trait Transport: Send + Sync + 'static {
    /// Queue `batch` for delivery to `peer`.
    ///
    /// An `Err` only means the delta could not be queued locally. The engine
    /// logs it and relies on retransmission, as it does for any loss.
    fn send_delta(&self, peer: &NodeId, batch: &[Value]) -> Result<()>;
}

/// Hand `batch` to the transport, logging and counting a failed enqueue
pub(crate) fn deliver(
    transport: &dyn Transport,
    stats: &crate::gossip::SharedStats,
    peer: &NodeId,
    batch: &[Value],
) -> bool {
    match transport.send_delta(peer, batch) {
        Ok(()) => {
            stats.write().batches_sent += 1;
            true
        }
        Err(e) => {
            stats.write().send_failures += 1;
            tracing::warn!(peer = %peer, size = batch.len(), "failed to queue delta: {}", e);
            false
        }
    }
}
