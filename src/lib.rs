//! # catree
//!
//! A content-addressed, append-only Merkle tree over a durable node store.
//!
//! Leaves are appended in batches; every internal node is keyed by its own
//! hash, so equal subtrees share storage and any committed root can be
//! walked back from disk. Mutations are staged in an uncommitted layer and
//! become durable in a single store transaction on commit.
//!
//! ## Layers
//!
//! - [`store`]: single-writer, multi-reader transactional blob store
//! - [`cache`]: uncommitted and read-through node layers over the store
//! - [`tree`]: the tree itself, generic over a [`HashPolicy`]
//! - [`concurrency`]: worker pool and signals driving the asynchronous API
//!
//! ## Example
//!
//! ```ignore
//! use catree::{block_on, Blake3Policy, ContentAddressedTree, Hash, NodeStore,
//!              StoreConfig, ThreadPool, TreeConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(NodeStore::open(StoreConfig::new(".catree", "notes"))?);
//! let workers = Arc::new(ThreadPool::new(4)?);
//! let tree = ContentAddressedTree::<Blake3Policy>::open(store, TreeConfig::new("notes", 32), workers)?;
//!
//! block_on(|done| tree.add_values(vec![Hash::from_u64(1)], move |r| done.complete(r)));
//! block_on(|done| tree.commit(move |r| done.complete(r)));
//! ```

pub mod cache;
pub mod concurrency;
pub mod hashing;
pub mod model;
pub mod store;
pub mod tree;

mod error;

pub use cache::{CacheStats, CacheView, NodeCache};
pub use concurrency::{block_on, Completion, Signal, ThreadPool};
pub use error::{Error, Result};
pub use hashing::{Blake3Policy, HashPolicy, Sha256Policy, ZeroHashes};
pub use model::{Hash, HashPath, NodeData, NodeKey, TreeMeta};
pub use store::{NodeStore, StoreConfig};
pub use tree::{
    AddDataResponse, CommitResponse, ContentAddressedTree, TreeConfig, TreeMode, UpdateResponse,
};

/// Current on-disk format version
pub const VERSION: u32 = 1;

/// Magic bytes at the start of every store file
pub const MAGIC: &[u8; 8] = b"CATREEDB";

/// Deepest supported tree; leaf indices must fit in a `u64`
pub const MAX_DEPTH: u32 = 63;
