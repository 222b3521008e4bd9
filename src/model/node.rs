//! Tree node types

use super::Hash;
use serde::{Deserialize, Serialize};

/// Cache key of a node: its content hash plus its level (0 = leaf)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub hash: Hash,
    pub level: u32,
}

impl NodeKey {
    pub fn new(hash: Hash, level: u32) -> Self {
        NodeKey { hash, level }
    }
}

/// Payload of an internal node
///
/// Leaves are not stored as nodes: a leaf value is its own level-0 hash and is
/// recovered from its parent's children. Nodes are immutable; an update
/// produces a new node under a new hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub left: Hash,
    pub right: Hash,
}

impl NodeData {
    pub fn new(left: Hash, right: Hash) -> Self {
        NodeData { left, right }
    }

    /// Child selected by an index bit (0 = left, 1 = right)
    pub fn child(&self, bit: bool) -> Hash {
        if bit {
            self.right
        } else {
            self.left
        }
    }

    /// Encode for durable storage
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from durable storage
    pub fn from_bytes(data: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
