//! Hash paths and membership checks

use super::Hash;
use crate::hashing::HashPolicy;
use serde::{Deserialize, Serialize};

/// Sibling pairs from a leaf up to the root.
///
/// Entry `i` holds the (left, right) children at level `i` on the way from the
/// leaf to the root: one of them is the running node, the other its sibling.
/// The length equals the tree depth.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPath(Vec<(Hash, Hash)>);

impl HashPath {
    pub fn new(pairs: Vec<(Hash, Hash)>) -> Self {
        HashPath(pairs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(Hash, Hash)] {
        &self.0
    }

    /// Sibling of the path node at `level`
    pub fn sibling(&self, index: u64, level: u32) -> Option<Hash> {
        let (left, right) = self.0.get(level as usize)?;
        Some(if (index >> level) & 1 == 1 { *left } else { *right })
    }

    /// The leaf value at `index`, read from the level-0 pair
    pub fn leaf(&self, index: u64) -> Option<Hash> {
        let (left, right) = self.0.first()?;
        Some(if index & 1 == 1 { *right } else { *left })
    }

    /// Recompute the root from a node of height `at_height` whose subtree
    /// contains leaf `index`. Only the pairs from `at_height` upward are used.
    pub fn compute_subtree_root<P: HashPolicy>(&self, value: Hash, index: u64, at_height: u32) -> Hash {
        let mut current = value;
        for (level, (left, right)) in self.0.iter().enumerate().skip(at_height as usize) {
            current = if (index >> level) & 1 == 1 {
                P::hash_pair(left, &current)
            } else {
                P::hash_pair(&current, right)
            };
        }
        current
    }

    /// Recompute the root from a leaf value and its index
    pub fn compute_root<P: HashPolicy>(&self, leaf: Hash, index: u64) -> Hash {
        self.compute_subtree_root::<P>(leaf, index, 0)
    }

    /// Whether a subtree root of height `at_height` sits at `index` under `root`
    pub fn check_subtree_membership<P: HashPolicy>(
        &self,
        root: &Hash,
        value: Hash,
        index: u64,
        at_height: u32,
    ) -> bool {
        self.compute_subtree_root::<P>(value, index, at_height) == *root
    }

    /// Whether `leaf` sits at `index` in the tree with `root`
    pub fn check_membership<P: HashPolicy>(&self, root: &Hash, leaf: Hash, index: u64) -> bool {
        self.check_subtree_membership::<P>(root, leaf, index, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Blake3Policy;

    fn h(a: &Hash, b: &Hash) -> Hash {
        Blake3Policy::hash_pair(a, b)
    }

    #[test]
    fn test_compute_root_depth_two() {
        let leaves: Vec<Hash> = (1..=4).map(Hash::from_u64).collect();
        let n01 = h(&leaves[0], &leaves[1]);
        let n23 = h(&leaves[2], &leaves[3]);
        let root = h(&n01, &n23);

        // Path for index 2: level 0 pair (2, 3), level 1 pair (n01, n23)
        let path = HashPath::new(vec![(leaves[2], leaves[3]), (n01, n23)]);
        assert_eq!(path.compute_root::<Blake3Policy>(leaves[2], 2), root);
        assert!(path.check_membership::<Blake3Policy>(&root, leaves[2], 2));
        assert!(!path.check_membership::<Blake3Policy>(&root, leaves[0], 2));
        assert_eq!(path.leaf(2), Some(leaves[2]));
        assert_eq!(path.sibling(2, 0), Some(leaves[3]));
        assert_eq!(path.sibling(2, 1), Some(n01));
    }

    #[test]
    fn test_subtree_membership() {
        let leaves: Vec<Hash> = (1..=4).map(Hash::from_u64).collect();
        let n01 = h(&leaves[0], &leaves[1]);
        let n23 = h(&leaves[2], &leaves[3]);
        let root = h(&n01, &n23);
        let path = HashPath::new(vec![(leaves[0], leaves[1]), (n01, n23)]);

        // n01 is the height-1 subtree holding leaves 0 and 1
        assert!(path.check_subtree_membership::<Blake3Policy>(&root, n01, 1, 1));
        assert!(!path.check_subtree_membership::<Blake3Policy>(&root, n23, 1, 1));
    }
}
