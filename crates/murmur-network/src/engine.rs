//! # Dissemination Engine
//!
//! The long-lived context object a node owns. It holds the value set, the
//! transport and, once topology is known, the peer registry together with the
//! scheduler and ack handler built over it.
//!
//! Topology is installed exactly once. Concurrent callers of
//! [`Dissemination::initialize_topology`] block until the single setup run
//! finishes, and only that run starts the scheduler task.

use crate::ack::{AckHandler, AckOutcome};
use crate::gossip::{GossipConfig, GossipStats, SharedStats};
use crate::peer::{PeerChannel, PeerRegistry};
use crate::scheduler::{GossipScheduler, TickReport};
use crate::transport::Transport;
use murmur_core::types::{NodeId, Value};
use murmur_core::value_set::ValueSet;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Topology {
    registry: Arc<PeerRegistry>,
    scheduler: GossipScheduler,
    acks: AckHandler,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Gossip dissemination context for one node
pub struct Dissemination {
    config: GossipConfig,
    values: Arc<ValueSet>,
    transport: Arc<dyn Transport>,
    stats: SharedStats,
    topology: OnceCell<Topology>,
}

impl Dissemination {
    /// Create an engine with an empty value set and no peers yet
    pub fn new(config: GossipConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            values: Arc::new(ValueSet::new()),
            transport,
            stats: Arc::new(RwLock::new(GossipStats::default())),
            topology: OnceCell::new(),
        }
    }

    /// Learn a value from a local client. Returns true if it was new.
    pub fn record_local_value(&self, value: Value) -> bool {
        if !self.values.add(value) {
            self.stats.write().duplicates_received += 1;
            return false;
        }

        self.stats.write().values_learned += 1;
        if let Some(topology) = self.topology.get() {
            topology.registry.fan_out(value, None);
        }
        true
    }

    /// Merge a delta from `sender`, returning the values that were new.
    ///
    /// New values are queued for every peer, except `sender` when
    /// `exclude_sender` is set.
    pub fn record_peer_batch(&self, sender: &NodeId, batch: &[Value]) -> Vec<Value> {
        let learned = self.values.add_all(batch.iter().copied());

        {
            let mut stats = self.stats.write();
            stats.values_learned += learned.len() as u64;
            stats.duplicates_received += (batch.len() - learned.len()) as u64;
        }

        if let Some(topology) = self.topology.get() {
            let skip = self.config.exclude_sender.then_some(sender);
            for value in &learned {
                topology.registry.fan_out(*value, skip);
            }
        }

        if !learned.is_empty() {
            debug!(from = %sender, new = learned.len(), total = batch.len(), "merged delta");
        }
        learned
    }

    /// Every value this node knows, unordered
    pub fn current_known_values(&self) -> Vec<Value> {
        self.values.snapshot()
    }

    /// Build the peer registry and start the scheduler, once.
    ///
    /// Returns true only for the call that performed the setup. Outside a
    /// Tokio runtime no scheduler task is spawned and callers drive
    /// [`Dissemination::tick`] themselves.
    pub fn initialize_topology(
        &self,
        local: NodeId,
        peers: impl IntoIterator<Item = NodeId>,
    ) -> bool {
        let mut performed = false;
        let topology = self.topology.get_or_init(|| {
            performed = true;
            self.build_topology(local, peers)
        });

        if performed {
            // Values added while the registry was being built saw no topology
            // and skipped fan-out; they are all in this second snapshot.
            let known = self.values.snapshot();
            let late: usize = topology
                .registry
                .channels()
                .map(|channel| channel.enqueue_all(known.iter().copied()))
                .sum();
            if late > 0 {
                debug!(queued = late, "queued values learned during topology setup");
            }
        }
        performed
    }

    fn build_topology(&self, local: NodeId, peers: impl IntoIterator<Item = NodeId>) -> Topology {
        let registry = Arc::new(PeerRegistry::new(
            local,
            peers,
            self.config.retry_timeout,
        ));

        // Values learned before the registry existed still have to go out
        let known = self.values.snapshot();
        for channel in registry.channels() {
            channel.enqueue_all(known.iter().copied());
        }

        let scheduler = GossipScheduler::new(
            registry.clone(),
            self.transport.clone(),
            self.config.clone(),
            self.stats.clone(),
        );
        let acks = AckHandler::new(
            registry.clone(),
            self.values.clone(),
            self.transport.clone(),
            self.config.clone(),
            self.stats.clone(),
        );

        let (shutdown_tx, task) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::channel(1);
                let task = handle.spawn(scheduler.clone().run(rx));
                (Some(tx), Some(task))
            }
            Err(_) => {
                warn!("No Tokio runtime; gossip scheduler must be ticked manually");
                (None, None)
            }
        };

        info!(
            "Topology initialized as {} with {} peers, {} values queued",
            registry.local(),
            registry.len(),
            known.len()
        );

        Topology {
            registry,
            scheduler,
            acks,
            shutdown_tx: Mutex::new(shutdown_tx),
            task: Mutex::new(task),
        }
    }

    /// Handle a delivery acknowledgement from `peer`
    pub fn on_delivery_ack(&self, peer: &NodeId) -> AckOutcome {
        match self.topology.get() {
            Some(topology) => topology.acks.on_delivery_ack(peer),
            None => {
                self.stats.write().acks_ignored += 1;
                debug!(peer = %peer, "ack before topology; ignoring");
                AckOutcome::UnknownPeer
            }
        }
    }

    /// Run one scheduler round by hand
    pub fn tick(&self) -> TickReport {
        self.topology
            .get()
            .map(|topology| topology.scheduler.tick())
            .unwrap_or_default()
    }

    /// Whether topology has been installed
    pub fn is_initialized(&self) -> bool {
        self.topology.get().is_some()
    }

    /// Registered peers, sorted
    pub fn peers(&self) -> Vec<NodeId> {
        self.topology
            .get()
            .map(|topology| topology.registry.peers().cloned().collect())
            .unwrap_or_default()
    }

    /// Outbound channel for `peer`
    pub fn peer_channel(&self, peer: &NodeId) -> Option<&PeerChannel> {
        self.topology.get()?.registry.get(peer)
    }

    /// The node's value set
    pub fn values(&self) -> &Arc<ValueSet> {
        &self.values
    }

    /// Get statistics
    pub fn stats(&self) -> GossipStats {
        self.stats.read().clone()
    }

    /// Get configuration
    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Stop the scheduler task, if one was started, and wait for it
    pub async fn shutdown(&self) {
        let Some(topology) = self.topology.get() else {
            return;
        };

        let shutdown_tx = topology.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }
        let task = topology.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Gossip scheduler task ended abnormally: {}", e);
            }
        }

        let stats = self.stats();
        info!(
            "Gossip stopped: {} batches sent, {} retransmissions, {} acks, {} replays",
            stats.batches_sent, stats.retransmissions, stats.acks_received, stats.anti_entropy_replays
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::error::Result;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

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

    fn engine(config: GossipConfig) -> (Dissemination, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (Dissemination::new(config, transport.clone()), transport)
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().copied().map(NodeId::from).collect()
    }

    #[test]
    fn test_broadcast_tick_ack_scenario() {
        let (engine, _) = engine(GossipConfig::default());
        let (a, b) = (NodeId::from("n2"), NodeId::from("n3"));

        assert!(engine.record_local_value(42));
        assert_eq!(engine.current_known_values(), vec![42]);

        assert!(engine.initialize_topology(NodeId::from("n1"), ids(&["n1", "n2", "n3"])));
        assert_eq!(engine.peers(), vec![a.clone(), b.clone()]);

        let report = engine.tick();
        assert_eq!(report.fresh, 2);
        assert_eq!(engine.peer_channel(&a).unwrap().in_flight(), Some(vec![42]));
        assert_eq!(engine.peer_channel(&b).unwrap().in_flight(), Some(vec![42]));

        // Nothing new pending, so the ack replays the known set to A
        let outcome = engine.on_delivery_ack(&a);
        assert_eq!(outcome, AckOutcome::Replayed(vec![42]));
        assert_eq!(engine.peer_channel(&a).unwrap().in_flight(), Some(vec![42]));

        // B is still waiting on its first ack
        assert_eq!(engine.peer_channel(&b).unwrap().in_flight(), Some(vec![42]));
        assert_eq!(engine.peer_channel(&b).unwrap().pending_len(), 0);
    }

    #[test]
    fn test_peer_batch_skips_sender() {
        let (engine, _) = engine(GossipConfig::default());
        engine.initialize_topology(NodeId::from("n1"), ids(&["n1", "n2", "n3", "n4"]));
        engine.record_local_value(7);
        engine.tick();
        for peer in ids(&["n2", "n3", "n4"]) {
            engine.peer_channel(&peer).unwrap().ack_clear();
        }

        let learned = engine.record_peer_batch(&NodeId::from("n2"), &[7, 8]);
        assert_eq!(learned, vec![8]);

        let mut known = engine.current_known_values();
        known.sort_unstable();
        assert_eq!(known, vec![7, 8]);

        assert_eq!(engine.peer_channel(&NodeId::from("n2")).unwrap().pending_len(), 0);
        assert_eq!(engine.peer_channel(&NodeId::from("n3")).unwrap().pending(), vec![8]);
        assert_eq!(engine.peer_channel(&NodeId::from("n4")).unwrap().pending(), vec![8]);
        assert_eq!(engine.stats().duplicates_received, 1);
    }

    #[test]
    fn test_peer_batch_fans_out_to_all_when_configured() {
        let (engine, _) = engine(GossipConfig {
            exclude_sender: false,
            ..GossipConfig::default()
        });
        engine.initialize_topology(NodeId::from("n1"), ids(&["n2", "n3"]));

        engine.record_peer_batch(&NodeId::from("n2"), &[8]);
        assert_eq!(engine.peer_channel(&NodeId::from("n2")).unwrap().pending(), vec![8]);
        assert_eq!(engine.peer_channel(&NodeId::from("n3")).unwrap().pending(), vec![8]);
    }

    #[test]
    fn test_duplicate_local_value_is_not_requeued() {
        let (engine, _) = engine(GossipConfig::default());
        engine.initialize_topology(NodeId::from("n1"), ids(&["n2"]));

        assert!(engine.record_local_value(1));
        engine.tick();
        assert!(!engine.record_local_value(1));
        assert_eq!(engine.peer_channel(&NodeId::from("n2")).unwrap().pending_len(), 0);
    }

    #[test]
    fn test_initialize_topology_runs_once() {
        let (engine, _) = engine(GossipConfig::default());

        assert!(engine.initialize_topology(NodeId::from("n1"), ids(&["n2"])));
        assert!(!engine.initialize_topology(NodeId::from("n1"), ids(&["n2", "n3", "n4"])));
        assert_eq!(engine.peers(), ids(&["n2"]));
    }

    #[test]
    fn test_concurrent_initialize_topology_single_setup() {
        let (engine, _) = engine(GossipConfig::default());
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let performed =
                        engine.initialize_topology(NodeId::from("n1"), ids(&["n2", "n3"]));
                    // Every caller sees a finished registry
                    assert_eq!(engine.peers().len(), 2);
                    performed
                })
            })
            .collect();

        let performed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|p| *p)
            .count();
        assert_eq!(performed, 1);
    }

    #[test]
    fn test_values_recorded_during_setup_reach_every_peer() {
        for _ in 0..2000 {
            let (engine, _) = engine(GossipConfig::default());
            let engine = Arc::new(engine);
            let barrier = Arc::new(Barrier::new(3));

            let local = {
                let (engine, barrier) = (engine.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    engine.record_local_value(1);
                })
            };
            let relayed = {
                let (engine, barrier) = (engine.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    engine.record_peer_batch(&NodeId::from("n2"), &[2]);
                })
            };
            barrier.wait();
            engine.initialize_topology(NodeId::from("n1"), ids(&["n2", "n3"]));
            local.join().unwrap();
            relayed.join().unwrap();

            let queued = |peer: &str| {
                let channel = engine.peer_channel(&NodeId::from(peer)).unwrap();
                let mut values = channel.pending();
                values.extend(channel.in_flight().unwrap_or_default());
                values
            };
            assert!(queued("n2").contains(&1));
            assert!(queued("n3").contains(&1));
            assert!(queued("n3").contains(&2));
        }
    }

    #[test]
    fn test_calls_before_topology_are_safe() {
        let (engine, transport) = engine(GossipConfig::default());

        assert_eq!(engine.tick(), TickReport::default());
        assert_eq!(engine.on_delivery_ack(&NodeId::from("n2")), AckOutcome::UnknownPeer);
        assert!(engine.peer_channel(&NodeId::from("n2")).is_none());
        assert!(transport.sent.lock().is_empty());
        assert!(!engine.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_task_started_and_stopped() {
        let (engine, transport) = engine(GossipConfig::default());
        engine.record_local_value(5);
        engine.initialize_topology(NodeId::from("n1"), ids(&["n2"]));

        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.shutdown().await;

        let sent = transport.sent.lock();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|(peer, batch)| peer.as_str() == "n2" && batch == &vec![5]));
    }
}
