//! # Value Set
//!
//! The set of every value this node has learned, from clients or from peers.
//!
//! The set only grows. `add` is an atomic test-and-insert, so among any number
//! of concurrent adds of the same value exactly one observes `true`; that
//! caller is the one responsible for fanning the value out to peers.

use crate::types::Value;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Concurrency-safe, monotonically growing set of values
#[derive(Debug, Default)]
pub struct ValueSet {
    values: RwLock<HashSet<Value>>,
}

impl ValueSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` if absent. Returns true iff this call inserted it.
    pub fn add(&self, value: Value) -> bool {
        self.values.write().insert(value)
    }

    /// Insert every value, returning the ones that were new, in input order
    pub fn add_all(&self, values: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut set = self.values.write();
        values.into_iter().filter(|v| set.insert(*v)).collect()
    }

    /// Membership test
    pub fn contains(&self, value: Value) -> bool {
        self.values.read().contains(&value)
    }

    /// Point-in-time copy of all members, unordered.
    ///
    /// The read lock is released before this returns.
    pub fn snapshot(&self) -> Vec<Value> {
        self.values.read().iter().copied().collect()
    }

    /// Number of known values
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Reset to empty.
    ///
    /// Breaks the growth invariant every other component relies on: only for
    /// tests and harness resets, never on a serving node.
    #[doc(hidden)]
    pub fn clear(&self) {
        let mut set = self.values.write();
        tracing::warn!(dropped = set.len(), "value set cleared (non-production reset)");
        set.clear();
    }
}
