//! Durable node store
//!
//! The persistence layer under the node cache: a multi-reader/single-writer
//! transactional store keyed by content hash, one directory per store.

mod blob;
mod node_store;

pub use blob::{Blob, BlobType};
pub use node_store::{CommitStats, NodeStore, ReadTransaction, StoreConfig, WriteTransaction};
