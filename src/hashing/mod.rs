//! Pluggable hash policies
//!
//! A tree is generic over a [`HashPolicy`]: the function combining two child
//! hashes into their parent. Each policy also owns a table of zero-subtree
//! hashes, `Z(0) = 0` and `Z(h + 1) = H(Z(h), Z(h))`, computed once per process.

mod policies;

pub use policies::{Blake3Policy, Sha256Policy};

use crate::model::Hash;
use crate::MAX_DEPTH;

/// Combines two child hashes into a parent hash.
///
/// Implementations must be deterministic and collision resistant. They are
/// zero-sized marker types; the tree never holds an instance.
pub trait HashPolicy: Send + Sync + 'static {
    /// Stable identifier persisted alongside the tree metadata
    const NAME: &'static str;

    /// Hash a (left, right) pair of children
    fn hash_pair(left: &Hash, right: &Hash) -> Hash;

    /// The process-wide zero-subtree table for this policy
    fn zero_hashes() -> &'static ZeroHashes;

    /// Hash of an all-empty subtree of the given height
    fn zero_hash(height: u32) -> Hash {
        Self::zero_hashes().at(height)
    }
}

/// Precomputed hashes of empty subtrees, indexed by height
#[derive(Clone, Debug)]
pub struct ZeroHashes {
    hashes: Vec<Hash>,
}

impl ZeroHashes {
    /// Compute the table for heights `0..=MAX_DEPTH`
    pub fn compute<P: HashPolicy>() -> Self {
        let mut hashes = Vec::with_capacity(MAX_DEPTH as usize + 1);
        let mut current = Hash::ZERO;
        hashes.push(current);
        for _ in 0..MAX_DEPTH {
            current = P::hash_pair(&current, &current);
            hashes.push(current);
        }
        ZeroHashes { hashes }
    }

    /// Zero hash at `height`. Panics if `height > MAX_DEPTH`, which tree
    /// construction rules out.
    pub fn at(&self, height: u32) -> Hash {
        self.hashes[height as usize]
    }

    /// Whether `hash` is the empty subtree at `height`
    pub fn is_zero_at(&self, hash: &Hash, height: u32) -> bool {
        self.hashes
            .get(height as usize)
            .is_some_and(|zero| zero == hash)
    }
}
