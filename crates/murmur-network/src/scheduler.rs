//! # Gossip Scheduler
//!
//! The periodic driver. Every tick visits each peer channel once and either
//! cuts a fresh batch, retransmits the outstanding one, or leaves the peer
//! alone. A tick never waits on a peer: sends are fire-and-forget and no
//! channel lock is held while the transport runs.

use crate::gossip::{GossipConfig, SharedStats};
use crate::peer::{PeerRegistry, Transmission};
use crate::transport::{deliver, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// What one tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Peers that got a freshly cut batch
    pub fresh: usize,
    /// Peers whose outstanding batch was sent again
    pub retransmitted: usize,
    /// Peers with nothing to send this tick
    pub idle: usize,
    /// Sends the transport refused
    pub failed: usize,
}

/// Periodic batch/retransmit driver over every peer channel
#[derive(Clone)]
pub struct GossipScheduler {
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn Transport>,
    config: GossipConfig,
    stats: SharedStats,
}

impl GossipScheduler {
    pub(crate) fn new(
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn Transport>,
        config: GossipConfig,
        stats: SharedStats,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            stats,
        }
    }

    /// Run one scheduling round over all peers
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for channel in self.registry.channels() {
            let transmission =
                match channel.poll(self.config.max_batch_size, self.config.retry_policy) {
                    Some(transmission) => transmission,
                    None => {
                        report.idle += 1;
                        continue;
                    }
                };

            match &transmission {
                Transmission::Fresh(batch) => {
                    report.fresh += 1;
                    debug!(peer = %channel.peer(), size = batch.len(), "sending delta");
                }
                Transmission::Retry(batch) => {
                    report.retransmitted += 1;
                    debug!(peer = %channel.peer(), size = batch.len(), "retransmitting delta");
                }
            }

            if !deliver(
                self.transport.as_ref(),
                &self.stats,
                channel.peer(),
                transmission.batch(),
            ) {
                report.failed += 1;
            }
        }

        if report.retransmitted > 0 {
            self.stats.write().retransmissions += report.retransmitted as u64;
        }

        report
    }

    /// Tick every `gossip_interval` until `shutdown_rx` fires or closes
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            "Starting gossip scheduler (interval: {}ms, peers: {}, max batch: {})",
            self.config.gossip_interval.as_millis(),
            self.registry.len(),
            self.config.max_batch_size
        );

        let mut interval = tokio::time::interval(self.config.gossip_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Gossip scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }
}
