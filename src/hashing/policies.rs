//! Concrete hash policies

use super::{HashPolicy, ZeroHashes};
use crate::model::Hash;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// BLAKE3 over the 64-byte concatenation of both children
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Policy;

impl HashPolicy for Blake3Policy {
    const NAME: &'static str = "blake3";

    fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        Hash::digest_many(&[left.as_bytes(), right.as_bytes()])
    }

    fn zero_hashes() -> &'static ZeroHashes {
        static TABLE: OnceLock<ZeroHashes> = OnceLock::new();
        TABLE.get_or_init(ZeroHashes::compute::<Self>)
    }
}

/// SHA-256 over the 64-byte concatenation of both children
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Policy;

impl HashPolicy for Sha256Policy {
    const NAME: &'static str = "sha256";

    fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Hash::from_bytes(bytes)
    }

    fn zero_hashes() -> &'static ZeroHashes {
        static TABLE: OnceLock<ZeroHashes> = OnceLock::new();
        TABLE.get_or_init(ZeroHashes::compute::<Self>)
    }
}
