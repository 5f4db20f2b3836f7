//! # Peer Channels
//!
//! Per-peer outbound state: the values not yet batched for a peer, the one
//! batch currently awaiting that peer's acknowledgement, and the deadline
//! after which the batch counts as lost.
//!
//! ## Window
//!
//! Each peer has a window of exactly one batch. A batch leaves `pending` when
//! it is cut, is retransmitted unchanged until acknowledged, and is never
//! folded back into `pending`.
//!
//! ```text
//!   enqueue ──► pending ──drain──► in_flight ──ack──► (cleared)
//!                                     │  ▲
//!                                     └──┘ retransmit (tick / deadline)
//! ```

use crate::gossip::RetryPolicy;
use murmur_core::types::{NodeId, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// What the scheduler should put on the wire for one peer this tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transmission {
    /// A batch freshly cut from pending
    Fresh(Vec<Value>),
    /// The unchanged in-flight batch, sent again
    Retry(Vec<Value>),
}

impl Transmission {
    pub fn batch(&self) -> &[Value] {
        match self {
            Self::Fresh(batch) | Self::Retry(batch) => batch,
        }
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    pending: HashSet<Value>,
    /// Never `Some(empty)`
    in_flight: Option<Vec<Value>>,
    deadline: Option<Instant>,
}

impl ChannelState {
    fn take_pending(&mut self, limit: usize) -> Vec<Value> {
        let batch: Vec<Value> = self.pending.iter().take(limit).copied().collect();
        for value in &batch {
            self.pending.remove(value);
        }
        batch
    }

    fn is_in_flight(&self, value: Value) -> bool {
        self.in_flight
            .as_ref()
            .map(|batch| batch.contains(&value))
            .unwrap_or(false)
    }

    fn arm(&mut self, batch: Vec<Value>, retry_timeout: Duration) {
        if batch.is_empty() {
            self.in_flight = None;
            self.deadline = None;
        } else {
            self.in_flight = Some(batch);
            self.deadline = Some(Instant::now() + retry_timeout);
        }
    }
}

/// Outbound state for a single peer
#[derive(Debug)]
pub struct PeerChannel {
    /// Peer this channel sends to
    peer: NodeId,

    /// How long an in-flight batch may go unacknowledged
    retry_timeout: Duration,

    state: Mutex<ChannelState>,
}

impl PeerChannel {
    /// Create an idle channel with nothing pending
    pub fn new(peer: NodeId, retry_timeout: Duration) -> Self {
        Self {
            peer,
            retry_timeout,
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Peer this channel belongs to
    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    /// Queue `value` for this peer.
    ///
    /// Returns false if it is already pending or currently in flight.
    pub fn enqueue(&self, value: Value) -> bool {
        let mut state = self.state.lock();
        if state.is_in_flight(value) {
            return false;
        }
        state.pending.insert(value)
    }

    /// Queue every value, returning how many were newly queued
    pub fn enqueue_all(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let mut state = self.state.lock();
        let mut queued = 0;
        for value in values {
            if !state.is_in_flight(value) && state.pending.insert(value) {
                queued += 1;
            }
        }
        queued
    }

    /// Remove up to `limit` values from pending, in no particular order
    pub fn drain_batch(&self, limit: usize) -> Vec<Value> {
        self.state.lock().take_pending(limit)
    }

    /// Record `batch` as the outstanding transmission and restart the deadline
    pub fn mark_in_flight(&self, batch: Vec<Value>) {
        let mut state = self.state.lock();
        if let Some(previous) = &state.in_flight {
            tracing::debug!(
                peer = %self.peer,
                replaced = previous.len(),
                "replacing unacknowledged batch"
            );
        }
        state.arm(batch, self.retry_timeout);
    }

    /// Discard the in-flight batch after the peer confirmed delivery
    pub fn ack_clear(&self) -> Option<Vec<Value>> {
        let mut state = self.state.lock();
        state.deadline = None;
        state.in_flight.take()
    }

    /// True once the deadline passed with a batch still unacknowledged
    pub fn timed_out(&self) -> bool {
        let state = self.state.lock();
        match (&state.in_flight, state.deadline) {
            (Some(_), Some(deadline)) => Instant::now() >= deadline,
            _ => false,
        }
    }

    /// One scheduler decision, taken under a single lock acquisition.
    ///
    /// Idle: cut a fresh batch of at most `limit` values, if any are pending.
    /// Awaiting ack: hand back the same batch when `policy` says it is due,
    /// re-arming the deadline.
    pub fn poll(&self, limit: usize, policy: RetryPolicy) -> Option<Transmission> {
        let mut state = self.state.lock();

        if let Some(batch) = &state.in_flight {
            let due = match policy {
                RetryPolicy::EveryTick => true,
                RetryPolicy::OnDeadline => state
                    .deadline
                    .map(|deadline| Instant::now() >= deadline)
                    .unwrap_or(true),
            };
            if !due {
                return None;
            }
            let batch = batch.clone();
            state.deadline = Some(Instant::now() + self.retry_timeout);
            return Some(Transmission::Retry(batch));
        }

        let batch = state.take_pending(limit);
        if batch.is_empty() {
            return None;
        }
        state.arm(batch.clone(), self.retry_timeout);
        Some(Transmission::Fresh(batch))
    }

    /// Cut and arm the next batch, unless one is already outstanding
    pub fn prime(&self, limit: usize) -> Option<Vec<Value>> {
        let mut state = self.state.lock();
        if state.in_flight.is_some() {
            return None;
        }
        let batch = state.take_pending(limit);
        if batch.is_empty() {
            return None;
        }
        state.arm(batch.clone(), self.retry_timeout);
        Some(batch)
    }

    /// Copy of the outstanding batch, if any
    pub fn in_flight(&self) -> Option<Vec<Value>> {
        self.state.lock().in_flight.clone()
    }

    /// Copy of the pending values, unordered
    pub fn pending(&self) -> Vec<Value> {
        self.state.lock().pending.iter().copied().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// When the outstanding batch expires
    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }
}

/// Every peer's channel, keyed by peer identity. Built once per node.
#[derive(Debug)]
pub struct PeerRegistry {
    /// Our node ID
    local: NodeId,

    channels: BTreeMap<NodeId, PeerChannel>,
}

impl PeerRegistry {
    /// Create a channel for every peer; `local` and duplicates are skipped
    pub fn new(
        local: NodeId,
        peers: impl IntoIterator<Item = NodeId>,
        retry_timeout: Duration,
    ) -> Self {
        let channels = peers
            .into_iter()
            .filter(|peer| *peer != local)
            .map(|peer| (peer.clone(), PeerChannel::new(peer, retry_timeout)))
            .collect();

        Self { local, channels }
    }

    /// Our node ID
    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Channel for `peer`, if it is a registered peer
    pub fn get(&self, peer: &NodeId) -> Option<&PeerChannel> {
        self.channels.get(peer)
    }

    /// Registered peers, in sorted order
    pub fn peers(&self) -> impl Iterator<Item = &NodeId> {
        self.channels.keys()
    }

    pub fn channels(&self) -> impl Iterator<Item = &PeerChannel> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Queue `value` for every peer except `skip`. Returns the number queued.
    pub fn fan_out(&self, value: Value, skip: Option<&NodeId>) -> usize {
        self.channels
            .values()
            .filter(|channel| Some(channel.peer()) != skip)
            .filter(|channel| channel.enqueue(value))
            .count()
    }
}
