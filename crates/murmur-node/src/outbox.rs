//! Outbound message queue
//!
//! Everything the node sends goes through one unbounded channel drained by
//! the stdout writer, so senders never wait on I/O. The outbox also stamps
//! each message with a fresh `msg_id` and is the engine's [`Transport`].

use crate::protocol::{Body, Envelope, Payload};
use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{NodeId, Value};
use murmur_network::Transport;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Queue of envelopes waiting for the writer
pub struct Outbox {
    local: OnceCell<NodeId>,
    tx: mpsc::UnboundedSender<Envelope>,
    next_msg_id: AtomicU64,
}

impl Outbox {
    /// Create an outbox and the receiver the writer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Self {
            local: OnceCell::new(),
            tx,
            next_msg_id: AtomicU64::new(1),
        };
        (outbox, rx)
    }

    /// Set the node's own id. Later calls are ignored.
    pub fn bind(&self, local: NodeId) {
        let _ = self.local.set(local);
    }

    /// The node's own id, once bound
    pub fn local(&self) -> Option<&NodeId> {
        self.local.get()
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn push(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| MurmurError::Transport("outbox closed".into()))
    }

    /// Send a new message from this node to `dest`
    pub fn send(&self, dest: &NodeId, payload: Payload) -> Result<()> {
        let src = self
            .local
            .get()
            .cloned()
            .ok_or_else(|| MurmurError::NotInitialized("no local node id".into()))?;

        self.push(Envelope {
            src,
            dest: dest.clone(),
            body: Body {
                msg_id: Some(self.next_msg_id()),
                in_reply_to: None,
                payload,
            },
        })
    }

    /// Answer `request`, addressed back to its sender
    pub fn reply(&self, request: &Envelope, payload: Payload) -> Result<()> {
        self.reply_to(&request.src, &request.dest, request.body.msg_id, payload)
    }

    /// Answer a message from `to` that was addressed to `from`
    pub fn reply_to(
        &self,
        to: &NodeId,
        from: &NodeId,
        in_reply_to: Option<u64>,
        payload: Payload,
    ) -> Result<()> {
        self.push(Envelope {
            src: from.clone(),
            dest: to.clone(),
            body: Body {
                msg_id: Some(self.next_msg_id()),
                in_reply_to,
                payload,
            },
        })
    }
}

impl Transport for Outbox {
    fn send_delta(&self, peer: &NodeId, batch: &[Value]) -> Result<()> {
        self.send(
            peer,
            Payload::Delta {
                messages: batch.to_vec(),
            },
        )
    }
}
