//! Error types for catree

use thiserror::Error;

/// Result type alias for catree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in catree operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A node reachable from a root is missing from both the cache and the
    /// durable store. The tree is inconsistent; retrying will not help.
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Store is locked by another writer")]
    Locked,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Batch of values is empty")]
    EmptyBatch,

    #[error("Capacity exceeded: inserting {requested} leaves at size {size} exceeds capacity {capacity}")]
    CapacityExceeded {
        requested: u64,
        size: u64,
        capacity: u64,
    },

    #[error("Index {index} out of range for tree of size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("Leaf {index} not yet inserted (tree size {size})")]
    LeafNotInserted { index: u64, size: u64 },

    #[error("Leaf updates are not permitted on an append-only tree")]
    UpdateNotPermitted,

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] Box<Error>),

    #[error("Concurrency violation: {0}")]
    ConcurrencyViolation(String),

    #[error("Too many concurrent readers (max {max})")]
    ReadersFull { max: usize },

    #[error("Store full: {required} bytes required, max size is {max_size}")]
    StoreFull { required: u64, max_size: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failed operation may be retried as-is.
    ///
    /// Only commit failures and writer lock contention qualify: both leave
    /// the uncommitted state untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::CommitFailed(_) | Error::Locked)
    }
}
