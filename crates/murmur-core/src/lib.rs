//! # Murmur Core
//!
//! Core data structures shared by every Murmur crate.
//!
//! This crate provides the fundamental building blocks:
//! - `NodeId` - Identity of a cluster member
//! - `Value` - The unit of knowledge being broadcast
//! - `ValueSet` - The per-node, monotonically growing set of known values
//! - `MurmurError` - Error type used across the workspace
//!
//! ## Architecture
//!
//! ```text
//!   client ──► broadcast(v) ──► ValueSet::add ──► PeerChannel (×N peers)
//!                                   ▲                    │
//!                                   │                    ▼
//!   peer delta ──────────────────────┘          scheduler / ack handler
//! ```

pub mod error;
pub mod types;
pub mod value_set;

pub use error::*;
pub use types::*;
pub use value_set::ValueSet;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{MurmurError, Result};
    pub use crate::types::{NodeId, Value};
    pub use crate::value_set::ValueSet;
}
