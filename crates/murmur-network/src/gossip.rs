//! # Gossip Configuration and Statistics
//!
//! Tuning knobs shared by the scheduler and the ack handler, plus the
//! counters both of them update.
//!
//! ## Protocol Overview
//!
//! 1. A value reaches node A (client broadcast or peer delta)
//! 2. A queues it on every peer channel
//! 3. Each tick, A cuts at most one batch per peer and sends it as a delta
//! 4. The peer merges the batch and answers `delta_ok`
//! 5. On the ack, A immediately cuts the next batch, or replays its whole set
//!    when nothing new is pending (anti-entropy)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// When an unacknowledged batch is sent again
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retransmit on every scheduler tick while the batch is outstanding
    #[default]
    EveryTick,
    /// Retransmit only once the retry deadline has passed
    OnDeadline,
}

/// Gossip engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Scheduler tick interval
    pub gossip_interval: Duration,

    /// How long a batch may go unacknowledged before it counts as lost
    pub retry_timeout: Duration,

    /// Maximum values per delta
    pub max_batch_size: usize,

    /// Retransmission policy for outstanding batches
    pub retry_policy: RetryPolicy,

    /// Replay the full value set on an ack when nothing is pending.
    ///
    /// Acks are matched by sender only, so under [`RetryPolicy::EveryTick`] a
    /// late ack for an earlier retransmission can clear a newer batch. With
    /// this off nothing re-queues that batch and its values can be lost.
    pub anti_entropy: bool,

    /// Do not echo values learned from a peer back to that peer
    pub exclude_sender: bool,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(50),
            retry_timeout: Duration::from_millis(100),
            max_batch_size: 128,
            retry_policy: RetryPolicy::EveryTick,
            anti_entropy: true,
            exclude_sender: true,
        }
    }
}

/// Gossip statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipStats {
    pub batches_sent: u64,
    pub retransmissions: u64,
    pub acks_received: u64,
    pub acks_ignored: u64,
    pub anti_entropy_replays: u64,
    pub values_learned: u64,
    pub duplicates_received: u64,
    pub send_failures: u64,
}

/// Stats handle shared between the engine's components
pub(crate) type SharedStats = Arc<RwLock<GossipStats>>;
