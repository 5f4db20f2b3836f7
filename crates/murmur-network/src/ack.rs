//! # Ack Handling
//!
//! A `delta_ok` from a peer frees that peer's window. The next batch is cut
//! and sent right away instead of waiting for the next tick. When nothing new
//! is pending, the whole value set is queued again for that peer, which
//! repairs values the peer lost despite acknowledging them and catches up
//! peers that joined late.

use crate::gossip::{GossipConfig, SharedStats};
use crate::peer::PeerRegistry;
use crate::transport::{deliver, Transport};
use murmur_core::types::{NodeId, Value};
use murmur_core::value_set::ValueSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// What an acknowledgement led to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// No channel for this peer; the ack was dropped
    UnknownPeer,
    /// Window cleared, nothing to send next
    Idle,
    /// Window cleared and the next pending batch sent
    Pipelined(Vec<Value>),
    /// Window cleared and a batch replayed from the full value set
    Replayed(Vec<Value>),
}

/// Reacts to delivery confirmations from peers
#[derive(Clone)]
pub struct AckHandler {
    registry: Arc<PeerRegistry>,
    values: Arc<ValueSet>,
    transport: Arc<dyn Transport>,
    config: GossipConfig,
    stats: SharedStats,
}

impl AckHandler {
    pub(crate) fn new(
        registry: Arc<PeerRegistry>,
        values: Arc<ValueSet>,
        transport: Arc<dyn Transport>,
        config: GossipConfig,
        stats: SharedStats,
    ) -> Self {
        Self {
            registry,
            values,
            transport,
            config,
            stats,
        }
    }

    /// Handle a `delta_ok` from `peer`
    pub fn on_delivery_ack(&self, peer: &NodeId) -> AckOutcome {
        let Some(channel) = self.registry.get(peer) else {
            self.stats.write().acks_ignored += 1;
            debug!(peer = %peer, "ignoring ack from unregistered peer");
            return AckOutcome::UnknownPeer;
        };

        self.stats.write().acks_received += 1;
        let cleared = channel.ack_clear();
        trace!(peer = %peer, cleared = cleared.map(|b| b.len()).unwrap_or(0), "delta acknowledged");

        let limit = self.config.max_batch_size;
        if let Some(batch) = channel.prime(limit) {
            debug!(peer = %peer, size = batch.len(), "pipelining next delta");
            deliver(self.transport.as_ref(), &self.stats, peer, &batch);
            return AckOutcome::Pipelined(batch);
        }

        if !self.config.anti_entropy {
            return AckOutcome::Idle;
        }

        let snapshot = self.values.snapshot();
        if snapshot.is_empty() {
            return AckOutcome::Idle;
        }
        channel.enqueue_all(snapshot);

        match channel.prime(limit) {
            Some(batch) => {
                self.stats.write().anti_entropy_replays += 1;
                debug!(peer = %peer, size = batch.len(), "replaying known values");
                deliver(self.transport.as_ref(), &self.stats, peer, &batch);
                AckOutcome::Replayed(batch)
            }
            // The scheduler already cut a batch for this peer
            None => AckOutcome::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::GossipStats;
    use murmur_core::error::Result;
    use parking_lot::{Mutex, RwLock};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(NodeId, Vec<Value>)>>,
    }

    impl Transport for RecordingTransport {
        fn send_delta(&self, peer: &NodeId, batch: &[Value]) -> Result<()> {
            self.sent.lock().push((peer.clone(), batch.to_vec()));
            Ok(())
        }
    }

    struct Fixture {
        handler: AckHandler,
        registry: Arc<PeerRegistry>,
        values: Arc<ValueSet>,
        transport: Arc<RecordingTransport>,
        stats: SharedStats,
    }

    fn fixture(config: GossipConfig) -> Fixture {
        let registry = Arc::new(PeerRegistry::new(
            NodeId::from("n1"),
            ["n2", "n3"].into_iter().map(NodeId::from),
            config.retry_timeout,
        ));
        let values = Arc::new(ValueSet::new());
        let transport = Arc::new(RecordingTransport::default());
        let stats = Arc::new(RwLock::new(GossipStats::default()));
        let handler = AckHandler::new(
            registry.clone(),
            values.clone(),
            transport.clone(),
            config,
            stats.clone(),
        );
        Fixture {
            handler,
            registry,
            values,
            transport,
            stats,
        }
    }

    #[test]
    fn test_unknown_peer_is_ignored() {
        let f = fixture(GossipConfig::default());

        let outcome = f.handler.on_delivery_ack(&NodeId::from("n9"));
        assert_eq!(outcome, AckOutcome::UnknownPeer);
        assert_eq!(f.stats.read().acks_ignored, 1);
        assert!(f.transport.sent.lock().is_empty());
    }

    #[test]
    fn test_ack_pipelines_pending_batch() {
        let f = fixture(GossipConfig::default());
        let peer = NodeId::from("n2");
        let channel = f.registry.get(&peer).unwrap();
        channel.mark_in_flight(vec![1]);
        channel.enqueue(2);

        let outcome = f.handler.on_delivery_ack(&peer);
        assert_eq!(outcome, AckOutcome::Pipelined(vec![2]));
        assert_eq!(channel.in_flight(), Some(vec![2]));
        assert_eq!(f.transport.sent.lock().as_slice(), &[(peer, vec![2])]);
    }

    #[test]
    fn test_ack_replays_full_set_when_idle() {
        let f = fixture(GossipConfig::default());
        let peer = NodeId::from("n2");
        f.values.add(42);
        f.registry.get(&peer).unwrap().mark_in_flight(vec![42]);

        let outcome = f.handler.on_delivery_ack(&peer);
        assert_eq!(outcome, AckOutcome::Replayed(vec![42]));
        assert_eq!(f.registry.get(&peer).unwrap().in_flight(), Some(vec![42]));
        assert_eq!(f.stats.read().anti_entropy_replays, 1);
    }

    #[test]
    fn test_ack_with_empty_value_set_goes_idle() {
        let f = fixture(GossipConfig::default());
        let peer = NodeId::from("n3");

        assert_eq!(f.handler.on_delivery_ack(&peer), AckOutcome::Idle);
        assert_eq!(f.registry.get(&peer).unwrap().in_flight(), None);
        assert_eq!(f.stats.read().acks_received, 1);
    }

    #[test]
    fn test_anti_entropy_disabled() {
        let f = fixture(GossipConfig {
            anti_entropy: false,
            ..GossipConfig::default()
        });
        let peer = NodeId::from("n2");
        f.values.add(42);
        f.registry.get(&peer).unwrap().mark_in_flight(vec![42]);

        assert_eq!(f.handler.on_delivery_ack(&peer), AckOutcome::Idle);
        assert_eq!(f.registry.get(&peer).unwrap().pending_len(), 0);
        assert!(f.transport.sent.lock().is_empty());
    }

    #[test]
    fn test_stale_ack_recovered_only_by_replay() {
        // An ack for an earlier send of [1] arrives after [2] went out
        let stale = |anti_entropy| {
            let f = fixture(GossipConfig {
                anti_entropy,
                ..GossipConfig::default()
            });
            let peer = NodeId::from("n2");
            f.values.add(1);
            f.values.add(2);
            f.registry.get(&peer).unwrap().mark_in_flight(vec![2]);
            let outcome = f.handler.on_delivery_ack(&peer);
            (outcome, f)
        };

        let (outcome, f) = stale(true);
        match outcome {
            AckOutcome::Replayed(batch) => assert!(batch.contains(&2)),
            other => panic!("expected replay, got {:?}", other),
        }
        assert!(f.registry.get(&NodeId::from("n2")).unwrap().in_flight().is_some());

        let (outcome, f) = stale(false);
        assert_eq!(outcome, AckOutcome::Idle);
        let channel = f.registry.get(&NodeId::from("n2")).unwrap();
        assert_eq!(channel.in_flight(), None);
        assert!(!channel.pending().contains(&2));
    }

    #[test]
    fn test_replay_is_chunked_by_batch_limit() {
        let f = fixture(GossipConfig {
            max_batch_size: 3,
            ..GossipConfig::default()
        });
        let peer = NodeId::from("n2");
        for v in 0..7 {
            f.values.add(v);
        }

        match f.handler.on_delivery_ack(&peer) {
            AckOutcome::Replayed(batch) => assert_eq!(batch.len(), 3),
            other => panic!("expected replay, got {:?}", other),
        }
        assert_eq!(f.registry.get(&peer).unwrap().pending_len(), 4);
    }
}
