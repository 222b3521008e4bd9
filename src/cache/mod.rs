//! Content-addressed node cache
//!
//! Shadows the durable [`NodeStore`] for one tree:
//! - an uncommitted layer holding every node written since the last commit,
//!   invisible to the store until [`NodeCache::commit`];
//! - a bounded read-through layer of committed nodes fetched from the store;
//! - the committed and pending tree metadata (root and size).
//!
//! Nodes are immutable and keyed by content, so inserting a key twice is a
//! no-op and no conflict resolution is ever needed.

use crate::model::{Hash, NodeData, NodeKey, TreeMeta};
use crate::store::{CommitStats, NodeStore};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use sieve_cache::SieveCache;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct MetaState {
    committed: TreeMeta,
    current: TreeMeta,
}

/// Occupancy of the cache layers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Nodes waiting for commit
    pub uncommitted_nodes: usize,
    /// Committed nodes held by the read-through layer
    pub cached_nodes: usize,
    /// Leaves inserted since the last commit
    pub pending_leaves: u64,
}

/// A consistent read of one version of the tree.
///
/// Holds the metadata lock shared, so a rollback cannot discard the nodes
/// under the view's root while it is alive. Drop it before any call that
/// changes the metadata.
pub struct CacheView<'a> {
    cache: &'a NodeCache,
    meta: RwLockReadGuard<'a, MetaState>,
    include_uncommitted: bool,
}

impl CacheView<'_> {
    pub fn meta(&self) -> &TreeMeta {
        if self.include_uncommitted {
            &self.meta.current
        } else {
            &self.meta.committed
        }
    }

    pub fn get_node(&self, hash: &Hash, level: u32) -> Result<NodeData> {
        self.cache.get_node(hash, level)
    }
}

/// Read-through, write-back cache of tree nodes over a durable store
pub struct NodeCache {
    store: Arc<NodeStore>,
    uncommitted: RwLock<HashMap<NodeKey, NodeData>>,
    read_cache: Mutex<SieveCache<NodeKey, NodeData>>,
    meta: RwLock<MetaState>,
}

impl NodeCache {
    /// Wrap `store`, starting from the committed metadata `committed`
    pub fn new(store: Arc<NodeStore>, committed: TreeMeta, capacity: usize) -> Result<Self> {
        let read_cache = SieveCache::new(capacity)
            .map_err(|error| Error::Config(format!("Could not initialize cache: {error}")))?;

        Ok(NodeCache {
            store,
            uncommitted: RwLock::new(HashMap::new()),
            read_cache: Mutex::new(read_cache),
            meta: RwLock::new(MetaState {
                current: committed.clone(),
                committed,
            }),
        })
    }

    /// Look a node up in the uncommitted layer, then the read cache, then the
    /// durable store. Durable hits are cached.
    pub fn find_node(&self, hash: &Hash, level: u32) -> Result<Option<NodeData>> {
        let key = NodeKey::new(*hash, level);

        if let Some(node) = self.uncommitted.read().get(&key) {
            return Ok(Some(*node));
        }

        if let Some(node) = self.read_cache.lock().get(&key) {
            return Ok(Some(*node));
        }

        let node = self.store.begin_read_transaction()?.get_node(hash)?;
        if let Some(node) = node {
            self.read_cache.lock().insert(key, node);
        }
        Ok(node)
    }

    /// Like [`find_node`](Self::find_node), but a miss is an integrity error
    pub fn get_node(&self, hash: &Hash, level: u32) -> Result<NodeData> {
        self.find_node(hash, level)?.ok_or_else(|| {
            warn!(hash = %hash, level, "node missing from cache and store");
            Error::NotFound(format!("{hash} at level {level}"))
        })
    }

    /// Insert a node into the uncommitted layer
    pub fn put_node(&self, hash: Hash, level: u32, data: NodeData) {
        self.uncommitted
            .write()
            .entry(NodeKey::new(hash, level))
            .or_insert(data);
    }

    /// Insert several nodes under one lock acquisition
    pub fn put_nodes<I>(&self, nodes: I)
    where
        I: IntoIterator<Item = (NodeKey, NodeData)>,
    {
        let mut uncommitted = self.uncommitted.write();
        for (key, data) in nodes {
            uncommitted.entry(key).or_insert(data);
        }
    }

    /// Tree metadata, either as last committed or including pending changes
    pub fn meta(&self, include_uncommitted: bool) -> TreeMeta {
        let meta = self.meta.read();
        if include_uncommitted {
            meta.current.clone()
        } else {
            meta.committed.clone()
        }
    }

    /// Pin the committed or pending version of the tree for a multi-node read
    pub fn view(&self, include_uncommitted: bool) -> CacheView<'_> {
        CacheView {
            cache: self,
            meta: self.meta.read(),
            include_uncommitted,
        }
    }

    /// Record the root and size produced by an uncommitted mutation
    pub fn set_pending(&self, root: Hash, size: u64) {
        let mut meta = self.meta.write();
        meta.current.root = root;
        meta.current.size = size;
    }

    /// Whether anything is waiting for commit
    pub fn has_pending(&self) -> bool {
        let meta = self.meta.read();
        meta.current != meta.committed || !self.uncommitted.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let pending_leaves = {
            let meta = self.meta.read();
            meta.current.size - meta.committed.size
        };
        CacheStats {
            uncommitted_nodes: self.uncommitted.read().len(),
            cached_nodes: self.read_cache.lock().len(),
            pending_leaves,
        }
    }

    /// Write the uncommitted layer and pending metadata to the store in one
    /// transaction, then promote them to committed.
    ///
    /// On failure nothing changes and the commit may be retried. With nothing
    /// pending the store is not touched.
    pub fn commit(&self) -> Result<CommitStats> {
        if !self.has_pending() {
            debug!("nothing to commit");
            return Ok(CommitStats::default());
        }

        let meta = self.meta.read().current.clone();
        let nodes: Vec<(NodeKey, NodeData)> = self
            .uncommitted
            .read()
            .iter()
            .map(|(key, data)| (*key, *data))
            .collect();

        let stats = self
            .write_batch(&nodes, &meta)
            .map_err(|error| {
                warn!(%error, nodes = nodes.len(), "commit failed");
                Error::CommitFailed(Box::new(error))
            })?;

        {
            let mut read_cache = self.read_cache.lock();
            for (key, data) in nodes {
                read_cache.insert(key, data);
            }
        }
        self.uncommitted.write().clear();
        self.meta.write().committed = meta.clone();

        info!(
            name = %meta.name,
            root = %meta.root.short(),
            size = meta.size,
            written = stats.entries,
            "committed tree"
        );
        Ok(stats)
    }

    /// Discard the uncommitted layer and pending metadata.
    ///
    /// Waits for open views, so no reader walks a pending root whose nodes
    /// are gone.
    pub fn rollback(&self) {
        let mut meta = self.meta.write();
        let discarded = {
            let mut uncommitted = self.uncommitted.write();
            let discarded = uncommitted.len();
            uncommitted.clear();
            discarded
        };
        meta.current = meta.committed.clone();
        debug!(discarded, size = meta.current.size, "rolled back tree");
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    fn write_batch(&self, nodes: &[(NodeKey, NodeData)], meta: &TreeMeta) -> Result<CommitStats> {
        let mut tx = self.store.begin_write_transaction()?;
        for (key, data) in nodes {
            tx.put_node(key.hash, data)?;
        }
        tx.set_meta(meta.clone());
        tx.commit()
    }
}
