//! Core type definitions for Murmur

use serde::{Deserialize, Serialize};
use std::fmt;

/// A broadcast value. The cluster converges on a set of these.
pub type Value = i64;

/// NodeId - Identity of a cluster member (`"n1"`, `"c3"`, ...)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering() {
        let mut ids = vec![NodeId::from("n3"), NodeId::from("n1"), NodeId::from("n2")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("n1"), NodeId::from("n2"), NodeId::from("n3")]);
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from("n1");
        assert_eq!(id.to_string(), "n1");
        assert_eq!(format!("{:?}", id), "NodeId(n1)");
    }
}
