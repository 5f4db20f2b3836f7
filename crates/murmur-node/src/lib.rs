//! # Murmur Node
//!
//! A cluster member speaking the JSON-lines broadcast protocol on
//! stdin/stdout, with the gossip engine underneath.

pub mod config;
pub mod node;
pub mod outbox;
pub mod protocol;
pub mod server;

pub use config::{GossipSettings, LogFormat, LoggingConfig, NodeConfig};
pub use node::{Membership, MurmurNode};
pub use outbox::Outbox;
pub use protocol::{Body, Envelope, Inbound, Payload};
pub use server::{run_stdio, serve};
