//! # Murmur Network Layer
//!
//! Gossip dissemination: every value a node learns is pushed to every peer in
//! acknowledged batches until the whole cluster agrees on the same set.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DISSEMINATION                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   ValueSet   │   │   Gossip     │   │     Ack      │         │
//! │  │  (dedup,     │──►│  Scheduler   │   │   Handler    │         │
//! │  │  monotonic)  │   │  (per tick)  │   │ (pipelining, │         │
//! │  └──────────────┘   └──────────────┘   │ anti-entropy)│         │
//! │         │                  │           └──────────────┘         │
//! │         ▼                  ▼                  │                 │
//! │  ┌────────────────────────────────────────────┴─────┐           │
//! │  │   PeerRegistry: one PeerChannel per peer         │           │
//! │  │   pending ──► in_flight (window = 1) ──► acked   │           │
//! │  └──────────────────────────────────────────────────┘           │
//! │                          │                                      │
//! │                   ┌──────┴──────┐                               │
//! │                   │  Transport  │  (fire-and-forget deltas)     │
//! │                   └─────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod ack;
pub mod engine;
pub mod gossip;
pub mod peer;
pub mod scheduler;
pub mod transport;

// Re-exports
pub use ack::{AckHandler, AckOutcome};
pub use engine::Dissemination;
pub use gossip::{GossipConfig, GossipStats, RetryPolicy};
pub use peer::{PeerChannel, PeerRegistry, Transmission};
pub use scheduler::{GossipScheduler, TickReport};
pub use transport::Transport;
