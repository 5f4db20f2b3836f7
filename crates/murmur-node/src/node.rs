//! Murmur node
//!
//! Turns decoded requests into calls on the dissemination engine and sends
//! the replies through the outbox.

use crate::outbox::Outbox;
use crate::protocol::{Envelope, Payload};
use murmur_core::error::{MurmurError, Result};
use murmur_core::types::NodeId;
use murmur_network::{Dissemination, GossipConfig};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity and cluster membership learned from `init`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub id: NodeId,
    pub members: Vec<NodeId>,
}

/// A cluster member answering protocol requests
pub struct MurmurNode {
    membership: OnceCell<Membership>,
    engine: Dissemination,
    outbox: Arc<Outbox>,
    generated: AtomicU64,
}

impl MurmurNode {
    /// Create a node that sends through `outbox`
    pub fn new(config: GossipConfig, outbox: Arc<Outbox>) -> Self {
        Self {
            membership: OnceCell::new(),
            engine: Dissemination::new(config, outbox.clone()),
            outbox,
            generated: AtomicU64::new(0),
        }
    }

    /// Handle one request and queue its reply, if it has one
    pub fn handle(&self, request: &Envelope) -> Result<()> {
        let reply = match self.respond(request) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(from = %request.src, code = e.code(), "request failed: {}", e);
                Payload::error(&e)
            }
        };
        self.outbox.reply(request, reply)
    }

    /// Tell `src` its message could not be decoded
    pub fn reject(
        &self,
        src: &NodeId,
        dest: &NodeId,
        msg_id: Option<u64>,
        reason: &str,
    ) -> Result<()> {
        let err = MurmurError::MalformedRequest(reason.to_string());
        self.outbox.reply_to(src, dest, msg_id, Payload::error(&err))
    }

    fn respond(&self, request: &Envelope) -> Result<Option<Payload>> {
        let payload = match &request.body.payload {
            Payload::Init { node_id, node_ids } => {
                self.init(node_id, node_ids);
                Payload::InitOk
            }
            Payload::Echo { echo } => Payload::EchoOk { echo: echo.clone() },
            Payload::Generate => Payload::GenerateOk {
                id: self.generate_id()?,
            },
            Payload::Broadcast { message } => {
                self.engine.record_local_value(*message);
                Payload::BroadcastOk
            }
            Payload::Read => {
                let mut messages = self.engine.current_known_values();
                messages.sort_unstable();
                Payload::ReadOk { messages }
            }
            Payload::Topology { .. } => {
                self.install_topology()?;
                Payload::TopologyOk
            }
            Payload::Delta { messages } => {
                self.engine.record_peer_batch(&request.src, messages);
                Payload::DeltaOk
            }
            Payload::DeltaOk => {
                self.engine.on_delivery_ack(&request.src);
                return Ok(None);
            }
            Payload::Unknown => {
                return Err(MurmurError::NotSupported("unknown message type".into()));
            }
            other => {
                debug!(from = %request.src, "ignoring unsolicited {:?}", other);
                return Ok(None);
            }
        };
        Ok(Some(payload))
    }

    fn init(&self, node_id: &NodeId, node_ids: &[NodeId]) {
        let membership = Membership {
            id: node_id.clone(),
            members: node_ids.to_vec(),
        };
        if self.membership.set(membership).is_err() {
            warn!("Repeated init for {}; keeping the first identity", node_id);
            return;
        }
        self.outbox.bind(node_id.clone());
        info!("Node {} initialized with {} members", node_id, node_ids.len());
    }

    fn install_topology(&self) -> Result<()> {
        let membership = self
            .membership
            .get()
            .ok_or_else(|| MurmurError::NotInitialized("topology before init".into()))?;

        if self
            .engine
            .initialize_topology(membership.id.clone(), membership.members.iter().cloned())
        {
            debug!("Gossiping to {:?}", self.engine.peers());
        }
        Ok(())
    }

    fn generate_id(&self) -> Result<String> {
        let membership = self
            .membership
            .get()
            .ok_or_else(|| MurmurError::NotInitialized("generate before init".into()))?;
        let n = self.generated.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}-{}", membership.id, n))
    }

    /// Identity and membership, once `init` arrived
    pub fn membership(&self) -> Option<&Membership> {
        self.membership.get()
    }

    /// The dissemination engine
    pub fn engine(&self) -> &Dissemination {
        &self.engine
    }

    /// Stop background gossip
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
