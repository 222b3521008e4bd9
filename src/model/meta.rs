//! Tree metadata persisted in the store's metadata slot

use super::Hash;
use serde::{Deserialize, Serialize};

/// Root, size and shape of a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMeta {
    /// Tree name (the store namespace)
    pub name: String,
    /// Fixed depth chosen at creation
    pub depth: u32,
    /// Name of the hash policy the nodes were built with
    pub hash_policy: String,
    /// Current root hash
    pub root: Hash,
    /// Number of leaves inserted
    pub size: u64,
}

impl TreeMeta {
    /// Maximum number of leaves
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }
}
