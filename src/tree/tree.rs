//! Content-addressed append-only Merkle tree

use super::{AddDataResponse, CommitResponse, TreeConfig, TreeMode, UpdateResponse};
use crate::cache::{CacheStats, CacheView, NodeCache};
use crate::concurrency::{Signal, ThreadPool};
use crate::hashing::HashPolicy;
use crate::model::{Hash, HashPath, NodeData, NodeKey, TreeMeta};
use crate::store::NodeStore;
use crate::{Error, Result};
use std::marker::PhantomData;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nodes produced while hashing one level: parent hashes in index order,
/// plus the non-empty parents to be cached.
type LevelOutput = (Vec<Hash>, Vec<(NodeKey, NodeData)>);

/// A fixed-depth Merkle tree whose nodes are stored by content hash.
///
/// Mutations (`add_values`, `update_value`, `commit`) are asynchronous: they
/// return at once and report through a callback invoked exactly once, from a
/// pool worker. One mutation may be in flight at a time; an overlapping one
/// fails with [`Error::ConcurrencyViolation`]. Reads may run concurrently
/// with anything. Clones share the same tree.
pub struct ContentAddressedTree<P: HashPolicy> {
    inner: Arc<TreeInner<P>>,
}

impl<P: HashPolicy> Clone for ContentAddressedTree<P> {
    fn clone(&self) -> Self {
        ContentAddressedTree {
            inner: self.inner.clone(),
        }
    }
}

struct TreeInner<P> {
    config: TreeConfig,
    cache: NodeCache,
    workers: Arc<ThreadPool>,
    /// Set while a mutation is in flight
    writer: AtomicBool,
    _policy: PhantomData<fn() -> P>,
}

/// Releases the writer flag when the mutation finishes, even by unwinding
struct WriterGuard<P: HashPolicy> {
    inner: Arc<TreeInner<P>>,
}

impl<P: HashPolicy> Drop for WriterGuard<P> {
    fn drop(&mut self) {
        self.inner.writer.store(false, Ordering::Release);
    }
}

/// Lowers a fan-in barrier when a hashing job ends, even by panicking
struct BarrierGuard<'a>(&'a Signal);

impl Drop for BarrierGuard<'_> {
    fn drop(&mut self) {
        self.0.signal_decrement();
    }
}

impl<P: HashPolicy> ContentAddressedTree<P> {
    /// Open the tree stored in `store`, initialising an empty one if the
    /// store holds no metadata yet.
    pub fn open(store: Arc<NodeStore>, config: TreeConfig, workers: Arc<ThreadPool>) -> Result<Self> {
        config.validate()?;

        let meta = match store.meta() {
            Some(meta) => {
                check_meta::<P>(&meta, &config)?;
                debug!(name = %meta.name, size = meta.size, root = %meta.root.short(), "restored tree");
                meta
            }
            None => {
                let meta = TreeMeta {
                    name: config.name.clone(),
                    depth: config.depth,
                    hash_policy: P::NAME.to_string(),
                    root: P::zero_hash(config.depth),
                    size: 0,
                };
                let mut tx = store.begin_write_transaction()?;
                tx.set_meta(meta.clone());
                tx.commit()?;
                info!(name = %meta.name, depth = meta.depth, policy = P::NAME, "initialised empty tree");
                meta
            }
        };

        let cache = NodeCache::new(store, meta, config.cache_capacity)?;
        Ok(ContentAddressedTree {
            inner: Arc::new(TreeInner {
                config,
                cache,
                workers,
                writer: AtomicBool::new(false),
                _policy: PhantomData,
            }),
        })
    }

    /// Append `values` at the next free indices.
    ///
    /// Fails (through the callback) with [`Error::EmptyBatch`] or
    /// [`Error::CapacityExceeded`], leaving the tree unchanged.
    pub fn add_values<F>(&self, values: Vec<Hash>, on_complete: F)
    where
        F: FnOnce(Result<AddDataResponse>) + Send + 'static,
    {
        self.spawn_mutation("add_values", on_complete, move |inner| inner.append(values));
    }

    /// Replace the leaf at `index`. Only permitted in [`TreeMode::Indexed`].
    pub fn update_value<F>(&self, index: u64, value: Hash, on_complete: F)
    where
        F: FnOnce(Result<UpdateResponse>) + Send + 'static,
    {
        if self.inner.config.mode != TreeMode::Indexed {
            on_complete(Err(Error::UpdateNotPermitted));
            return;
        }
        self.spawn_mutation("update_value", on_complete, move |inner| {
            inner.update(index, value)
        });
    }

    /// Make every pending mutation durable in one store transaction.
    ///
    /// On failure the pending state is kept as it was, so the commit can be
    /// retried.
    pub fn commit<F>(&self, on_complete: F)
    where
        F: FnOnce(Result<CommitResponse>) + Send + 'static,
    {
        self.spawn_mutation("commit", on_complete, |inner| {
            let stats = inner.cache.commit()?;
            let meta = inner.cache.meta(false);
            Ok(CommitResponse {
                root: meta.root,
                size: meta.size,
                nodes_written: stats.entries,
            })
        });
    }

    /// Discard every pending mutation, restoring the committed root and size
    pub fn rollback(&self) -> Result<()> {
        let _guard = self.inner.acquire_writer("rollback")?;
        self.inner.cache.rollback();
        Ok(())
    }

    /// Sibling path of the leaf at `index`, including pending mutations
    pub fn get_hash_path(&self, index: u64) -> Result<HashPath> {
        self.get_hash_path_at(index, true)
    }

    /// Sibling path of the leaf at `index`, against either the committed or
    /// the pending tree
    pub fn get_hash_path_at(&self, index: u64, include_uncommitted: bool) -> Result<HashPath> {
        let view = self.inner.cache.view(include_uncommitted);
        self.inner.check_index(index, view.meta().size)?;
        self.inner.path_from(&view, index)
    }

    /// [`get_hash_path_at`](Self::get_hash_path_at) run on the worker pool
    pub fn get_hash_path_async<F>(&self, index: u64, include_uncommitted: bool, on_complete: F)
    where
        F: FnOnce(Result<HashPath>) + Send + 'static,
    {
        let tree = self.clone();
        self.inner.workers.submit(move || {
            on_complete(guarded(|| tree.get_hash_path_at(index, include_uncommitted)));
        });
    }

    /// Value of the leaf at `index`
    pub fn get_leaf(&self, index: u64, include_uncommitted: bool) -> Result<Hash> {
        self.get_hash_path_at(index, include_uncommitted)?
            .leaf(index)
            .ok_or_else(|| Error::Internal("empty hash path".into()))
    }

    /// Current root, including pending mutations
    pub fn root(&self) -> Hash {
        self.inner.cache.meta(true).root
    }

    /// Current size, including pending insertions
    pub fn size(&self) -> u64 {
        self.inner.cache.meta(true).size
    }

    pub fn committed_root(&self) -> Hash {
        self.inner.cache.meta(false).root
    }

    pub fn committed_size(&self) -> u64 {
        self.inner.cache.meta(false).size
    }

    pub fn meta(&self, include_uncommitted: bool) -> TreeMeta {
        self.inner.cache.meta(include_uncommitted)
    }

    pub fn depth(&self) -> u32 {
        self.inner.config.depth
    }

    pub fn config(&self) -> &TreeConfig {
        &self.inner.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        self.inner.cache.store()
    }

    fn spawn_mutation<T, F, W>(&self, op: &'static str, on_complete: F, work: W)
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
        W: FnOnce(&TreeInner<P>) -> Result<T> + Send + 'static,
    {
        let guard = match self.inner.acquire_writer(op) {
            Ok(guard) => guard,
            Err(error) => {
                on_complete(Err(error));
                return;
            }
        };

        let inner = self.inner.clone();
        self.inner.workers.submit(move || {
            let result = guarded(|| work(&inner));
            if let Err(error) = &result {
                debug!(op, %error, "mutation failed");
            }
            // Released first so the callback may start the next mutation
            drop(guard);
            on_complete(result);
        });
    }
}

impl<P: HashPolicy> TreeInner<P> {
    fn acquire_writer(self: &Arc<Self>, op: &str) -> Result<WriterGuard<P>> {
        if self
            .writer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(op, name = %self.config.name, "overlapping mutation rejected");
            return Err(Error::ConcurrencyViolation(format!(
                "{op} started while another mutation is in flight"
            )));
        }
        Ok(WriterGuard {
            inner: self.clone(),
        })
    }

    fn check_index(&self, index: u64, size: u64) -> Result<()> {
        if index < size {
            return Ok(());
        }
        Err(match self.config.mode {
            TreeMode::Indexed => Error::IndexOutOfRange { index, size },
            TreeMode::AppendOnly => Error::LeafNotInserted { index, size },
        })
    }

    /// Walk from the view's root to leaf `index`, collecting the child pair of
    /// every node on the way. Empty subtrees are recognised by hash and never
    /// read.
    fn path_from(&self, view: &CacheView<'_>, index: u64) -> Result<HashPath> {
        let depth = self.config.depth;
        let zeros = P::zero_hashes();
        let mut pairs = vec![(Hash::ZERO, Hash::ZERO); depth as usize];
        let mut current = view.meta().root;

        for level in (1..=depth).rev() {
            let node = if zeros.is_zero_at(&current, level) {
                let below = zeros.at(level - 1);
                NodeData::new(below, below)
            } else {
                view.get_node(&current, level)?
            };
            pairs[(level - 1) as usize] = (node.left, node.right);
            current = node.child((index >> (level - 1)) & 1 == 1);
        }

        Ok(HashPath::new(pairs))
    }

    fn append(&self, values: Vec<Hash>) -> Result<AddDataResponse> {
        if values.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let requested = values.len() as u64;
        let (meta, frontier) = {
            let view = self.cache.view(true);
            let meta = view.meta().clone();
            let capacity = meta.capacity();
            if requested > capacity - meta.size {
                return Err(Error::CapacityExceeded {
                    requested,
                    size: meta.size,
                    capacity,
                });
            }
            // Path to the first free slot: its left siblings are the existing
            // nodes the new batch hashes against.
            let frontier = self.path_from(&view, meta.size)?;
            (meta, frontier)
        };

        let start = meta.size;

        let mut nodes = Vec::new();
        let mut current = values;
        let mut lo = start;
        let mut subtree = None;

        for level in 0..self.config.depth {
            if subtree.is_none() && current.len() == 1 {
                subtree = Some((current[0], level));
            }
            let left_edge = frontier.pairs()[level as usize].0;
            current = self.hash_level(level, lo, current, left_edge, &mut nodes)?;
            lo >>= 1;
        }

        let root = match current.as_slice() {
            [root] => *root,
            _ => {
                return Err(Error::Internal(format!(
                    "expected a single root, got {} nodes",
                    current.len()
                )))
            }
        };
        let (subtree_root, subtree_height) = subtree.unwrap_or((root, self.config.depth));

        let written = nodes.len();
        self.cache.put_nodes(nodes);
        self.cache.set_pending(root, start + requested);

        debug!(
            start,
            count = requested,
            nodes = written,
            root = %root.short(),
            "appended batch"
        );

        Ok(AddDataResponse {
            previous_root: meta.root,
            root,
            subtree_root,
            subtree_height,
            start_index: start,
            end_index: start + requested,
            size: start + requested,
        })
    }

    /// Hash the level above `children`, which occupy indices `lo..` at
    /// `level`. Wide levels are split into scoped pool jobs that lower a
    /// count-down barrier; the caller runs queued jobs while it waits.
    fn hash_level(
        &self,
        level: u32,
        lo: u64,
        children: Vec<Hash>,
        left_edge: Hash,
        nodes: &mut Vec<(NodeKey, NodeData)>,
    ) -> Result<Vec<Hash>> {
        let hi = lo + children.len() as u64 - 1;
        let parents = (lo >> 1)..(hi >> 1) + 1;
        let count = (parents.end - parents.start) as usize;
        let workers = self.workers.size();

        if count < self.config.parallel_threshold || workers < 2 {
            let (hashes, level_nodes) = hash_parents::<P>(&children, lo, left_edge, level, parents);
            nodes.extend(level_nodes);
            return Ok(hashes);
        }

        let chunk = count.div_ceil(workers) as u64;
        let ranges: Vec<Range<u64>> = (0..workers as u64)
            .map(|i| parents.start + i * chunk..(parents.start + (i + 1) * chunk).min(parents.end))
            .filter(|range| !range.is_empty())
            .collect();

        let barrier = Signal::new(ranges.len() as u32);
        let mut outputs: Vec<Option<LevelOutput>> = (0..ranges.len()).map(|_| None).collect();
        let children = children.as_slice();

        self.workers.scope(|scope| {
            for (output, range) in outputs.iter_mut().zip(ranges) {
                let barrier = &barrier;
                scope.spawn(move |_| {
                    let _guard = BarrierGuard(barrier);
                    *output = Some(hash_parents::<P>(children, lo, left_edge, level, range));
                });
            }
        });
        barrier.wait_for_level(0);

        let mut hashes = Vec::with_capacity(count);
        for output in outputs {
            let (chunk_hashes, chunk_nodes) = output.ok_or_else(|| {
                Error::Internal(format!("hashing job at level {level} did not complete"))
            })?;
            hashes.extend(chunk_hashes);
            nodes.extend(chunk_nodes);
        }
        Ok(hashes)
    }

    fn update(&self, index: u64, value: Hash) -> Result<UpdateResponse> {
        let (meta, path) = {
            let view = self.cache.view(true);
            self.check_index(index, view.meta().size)?;
            (view.meta().clone(), self.path_from(&view, index)?)
        };
        let previous_value = path
            .leaf(index)
            .ok_or_else(|| Error::Internal("empty hash path".into()))?;

        let zeros = P::zero_hashes();
        let mut nodes = Vec::with_capacity(path.len());
        let mut current = value;
        for (level, (left, right)) in path.pairs().iter().enumerate() {
            let node = if (index >> level) & 1 == 1 {
                NodeData::new(*left, current)
            } else {
                NodeData::new(current, *right)
            };
            current = P::hash_pair(&node.left, &node.right);
            let parent_level = level as u32 + 1;
            if !zeros.is_zero_at(&current, parent_level) {
                nodes.push((NodeKey::new(current, parent_level), node));
            }
        }

        self.cache.put_nodes(nodes);
        self.cache.set_pending(current, meta.size);
        debug!(index, root = %current.short(), "updated leaf");

        Ok(UpdateResponse {
            index,
            previous_value,
            previous_root: meta.root,
            root: current,
        })
    }
}

/// Parents `parents` at `level + 1` of the children occupying `lo..` at
/// `level`. Children left of `lo` resolve to `left_edge` (the existing
/// sibling); children right of the batch are empty subtrees.
fn hash_parents<P: HashPolicy>(
    children: &[Hash],
    lo: u64,
    left_edge: Hash,
    level: u32,
    parents: Range<u64>,
) -> LevelOutput {
    let hi = lo + children.len() as u64 - 1;
    let zeros = P::zero_hashes();
    let empty = zeros.at(level);

    let mut hashes = Vec::with_capacity((parents.end - parents.start) as usize);
    let mut nodes = Vec::new();
    for parent in parents {
        let (l, r) = (2 * parent, 2 * parent + 1);
        let left = if l < lo {
            left_edge
        } else {
            children[(l - lo) as usize]
        };
        let right = if r > hi {
            empty
        } else {
            children[(r - lo) as usize]
        };

        let hash = P::hash_pair(&left, &right);
        if !zeros.is_zero_at(&hash, level + 1) {
            nodes.push((NodeKey::new(hash, level + 1), NodeData::new(left, right)));
        }
        hashes.push(hash);
    }
    (hashes, nodes)
}

fn check_meta<P: HashPolicy>(meta: &TreeMeta, config: &TreeConfig) -> Result<()> {
    if meta.depth != config.depth {
        return Err(Error::Config(format!(
            "store holds a tree of depth {}, configured depth is {}",
            meta.depth, config.depth
        )));
    }
    if meta.hash_policy != P::NAME {
        return Err(Error::Config(format!(
            "store was built with hash policy {}, opened with {}",
            meta.hash_policy,
            P::NAME
        )));
    }
    if meta.name != config.name {
        return Err(Error::Config(format!(
            "store holds tree {:?}, configured name is {:?}",
            meta.name, config.name
        )));
    }
    Ok(())
}

/// Run `f`, turning a panic into an error so callbacks still fire once
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|_| Err(Error::Internal("operation panicked".into())))
}
