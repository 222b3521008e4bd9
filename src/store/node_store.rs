//! Durable content-addressed node store
//!
//! One directory per store, holding a single append-only file:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("CATREEDB")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - committed_len: 8 bytes (u64 LE)
//!   - segment_count: 8 bytes (u64 LE)
//!   - reserved: 32 bytes
//!
//! [SEGMENT]*  (one per committed write transaction)
//!   - magic: 4 bytes ("SEG1")
//!   - entry_count: 4 bytes (u32 LE)
//!   - blobs_len: 8 bytes (u64 LE)
//!   - meta_len: 4 bytes (u32 LE)
//!   - blobs, concatenated
//!   - index: entry_count * (hash 32, offset 8, size 4)
//!   - meta: bincode TreeMeta (meta_len bytes, may be empty)
//! ```
//!
//! The header's `committed_len` only moves after the segment is on disk, so a
//! torn commit leaves trailing bytes that are discarded on the next open.

use crate::model::{Hash, NodeData, TreeMeta};
use crate::store::blob::{Blob, BlobType};
use crate::{Error, Result, MAGIC, VERSION};
use memmap2::{Mmap, MmapOptions};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HEADER_SIZE: u64 = 64;
const SEGMENT_MAGIC: &[u8; 4] = b"SEG1";
const SEGMENT_HEADER_SIZE: u64 = 20;
const INDEX_ENTRY_SIZE: u64 = 44;
const FILE_NAME: &str = "nodes.db";

/// Configuration of a durable node store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Parent directory; the store lives in `<directory>/<name>/`
    pub directory: PathBuf,
    /// Store namespace
    pub name: String,
    /// Maximum size of the store file in bytes
    pub max_size: u64,
    /// Maximum number of concurrently open read transactions
    pub max_readers: usize,
    /// How long a writer waits for the write slot before failing
    pub write_lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            directory: PathBuf::from(".catree"),
            name: "tree".to_string(),
            max_size: 1 << 30,
            max_readers: 126,
            write_lock_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        StoreConfig {
            directory: directory.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Location of a blob in the file
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// Committed state visible to readers
struct Snapshot {
    len: u64,
    segments: u64,
    map: Mmap,
    meta: Option<TreeMeta>,
}

/// Outcome of a committed write transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// New blobs written
    pub entries: usize,
    /// Bytes appended to the file
    pub bytes: u64,
}

/// A content-addressed node store backed by a single file
///
/// Many read transactions may be open at once, each pinned to the snapshot
/// that was committed when it began. One write transaction at a time.
pub struct NodeStore {
    config: StoreConfig,
    /// Path to the store file
    path: PathBuf,
    /// The writer slot; holding it grants exclusive write access to the file
    writer: Mutex<File>,
    /// Hash -> location of every committed blob
    index: RwLock<HashMap<Hash, IndexEntry>>,
    /// Latest committed snapshot
    snapshot: RwLock<Arc<Snapshot>>,
    /// Number of open read transactions
    readers: AtomicUsize,
}

impl NodeStore {
    /// Open the store described by `config`, creating it if absent
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(Error::Config("store name must not be empty".into()));
        }
        if config.max_readers == 0 {
            return Err(Error::Config("max_readers must be at least 1".into()));
        }

        let dir = config.directory.join(&config.name);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(FILE_NAME);

        let mut file = if path.exists() {
            OpenOptions::new().read(true).write(true).open(&path)?
        } else {
            create_file(&path)?
        };

        let (committed_len, segment_count) = read_header(&mut file)?;

        let file_len = file.metadata()?.len();
        if file_len < committed_len {
            return Err(Error::Corruption(format!(
                "file is {file_len} bytes but header records {committed_len} committed"
            )));
        }
        if file_len > committed_len {
            warn!(
                path = %path.display(),
                discarded = file_len - committed_len,
                "discarding uncommitted tail"
            );
            file.set_len(committed_len)?;
            file.sync_all()?;
        }

        let map = map_prefix(&file, committed_len)?;
        let (index, meta, segments) = scan_segments(&map, committed_len)?;
        if segments != segment_count {
            return Err(Error::Corruption(format!(
                "header records {segment_count} segments, found {segments}"
            )));
        }

        info!(
            path = %path.display(),
            objects = index.len(),
            segments,
            bytes = committed_len,
            "opened node store"
        );

        Ok(NodeStore {
            config,
            path,
            writer: Mutex::new(file),
            index: RwLock::new(index),
            snapshot: RwLock::new(Arc::new(Snapshot {
                len: committed_len,
                segments,
                map,
                meta,
            })),
            readers: AtomicUsize::new(0),
        })
    }

    /// Begin a snapshot read
    pub fn begin_read_transaction(&self) -> Result<ReadTransaction<'_>> {
        let max = self.config.max_readers;
        if self.readers.fetch_add(1, Ordering::AcqRel) >= max {
            self.readers.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ReadersFull { max });
        }

        let snapshot = self.snapshot.read().clone();
        Ok(ReadTransaction {
            store: self,
            snapshot,
        })
    }

    /// Acquire the writer slot, waiting up to the configured timeout
    pub fn begin_write_transaction(&self) -> Result<WriteTransaction<'_>> {
        let timeout = Duration::from_millis(self.config.write_lock_timeout_ms);
        let file = self.writer.try_lock_for(timeout).ok_or(Error::Locked)?;
        Ok(WriteTransaction {
            store: self,
            file,
            pending: Vec::new(),
            staged: HashSet::new(),
            meta: None,
        })
    }

    /// Read a single payload outside an explicit transaction
    pub fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        self.begin_read_transaction()?.get(hash)
    }

    /// Check if a hash is durable
    pub fn contains(&self, hash: &Hash) -> bool {
        self.index.read().contains_key(hash)
    }

    /// Latest committed metadata
    pub fn meta(&self) -> Option<TreeMeta> {
        self.snapshot.read().meta.clone()
    }

    /// Number of distinct durable objects
    pub fn object_count(&self) -> usize {
        self.index.read().len()
    }

    /// Number of committed write transactions
    pub fn segment_count(&self) -> u64 {
        self.snapshot.read().segments
    }

    /// Committed file length in bytes
    pub fn committed_len(&self) -> u64 {
        self.snapshot.read().len
    }

    /// Get the store file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// A read-only view pinned to one committed snapshot
pub struct ReadTransaction<'a> {
    store: &'a NodeStore,
    snapshot: Arc<Snapshot>,
}

impl ReadTransaction<'_> {
    /// Retrieve a payload by hash
    pub fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        Ok(self.get_blob(hash)?.map(|blob| blob.data))
    }

    /// Retrieve and decode an internal node
    pub fn get_node(&self, hash: &Hash) -> Result<Option<NodeData>> {
        match self.get_blob(hash)? {
            Some(blob) if blob.blob_type == BlobType::Node => {
                Ok(Some(NodeData::from_bytes(&blob.data)?))
            }
            Some(blob) => Err(Error::Corruption(format!(
                "Expected Node, got {:?} for {}",
                blob.blob_type,
                hash.short()
            ))),
            None => Ok(None),
        }
    }

    /// Check if a hash is visible in this snapshot
    pub fn contains(&self, hash: &Hash) -> bool {
        self.entry(hash).is_some()
    }

    /// Metadata as of this snapshot
    pub fn meta(&self) -> Option<&TreeMeta> {
        self.snapshot.meta.as_ref()
    }

    fn entry(&self, hash: &Hash) -> Option<IndexEntry> {
        let entry = self.store.index.read().get(hash).copied()?;
        // Entries appended after this snapshot was taken stay invisible
        (entry.offset + entry.size as u64 <= self.snapshot.len).then_some(entry)
    }

    fn get_blob(&self, hash: &Hash) -> Result<Option<Blob>> {
        let Some(entry) = self.entry(hash) else {
            return Ok(None);
        };
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        Ok(Some(Blob::decode(&self.snapshot.map[start..end])?))
    }
}

impl Drop for ReadTransaction<'_> {
    fn drop(&mut self) {
        self.store.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive batch writer. Nothing reaches disk until [`commit`]; dropping
/// the transaction discards the batch.
///
/// [`commit`]: WriteTransaction::commit
pub struct WriteTransaction<'a> {
    store: &'a NodeStore,
    file: MutexGuard<'a, File>,
    pending: Vec<(Hash, Vec<u8>)>,
    staged: HashSet<Hash>,
    meta: Option<TreeMeta>,
}

impl WriteTransaction<'_> {
    /// Stage a blob. Returns false if the hash is already durable or staged.
    pub fn put(&mut self, hash: Hash, blob: &Blob) -> Result<bool> {
        if self.staged.contains(&hash) || self.store.contains(&hash) {
            return Ok(false);
        }
        self.pending.push((hash, blob.encode()));
        self.staged.insert(hash);
        Ok(true)
    }

    /// Stage an internal node
    pub fn put_node(&mut self, hash: Hash, node: &NodeData) -> Result<bool> {
        self.put(hash, &Blob::new(BlobType::Node, node.to_bytes()?))
    }

    /// Stage a batch of blobs, returning how many were new
    pub fn put_batch<I>(&mut self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (Hash, Blob)>,
    {
        let mut added = 0;
        for (hash, blob) in entries {
            if self.put(hash, &blob)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Stage the metadata slot
    pub fn set_meta(&mut self, meta: TreeMeta) {
        self.meta = Some(meta);
    }

    /// Number of staged blobs
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.meta.is_none()
    }

    /// Append the batch as one segment and publish it
    pub fn commit(mut self) -> Result<CommitStats> {
        if self.is_empty() {
            return Ok(CommitStats::default());
        }

        let previous = self.store.snapshot.read().clone();
        let start = previous.len;

        let meta_bytes = match &self.meta {
            Some(meta) => bincode::serialize(meta)?,
            None => Vec::new(),
        };
        let blobs_len: u64 = self.pending.iter().map(|(_, b)| b.len() as u64).sum();
        let segment_len = SEGMENT_HEADER_SIZE
            + blobs_len
            + self.pending.len() as u64 * INDEX_ENTRY_SIZE
            + meta_bytes.len() as u64;
        let end = start + segment_len;

        if end > self.store.config.max_size {
            return Err(Error::StoreFull {
                required: end,
                max_size: self.store.config.max_size,
            });
        }

        let mut buf = Vec::with_capacity(segment_len as usize);
        buf.extend_from_slice(SEGMENT_MAGIC);
        buf.extend_from_slice(&(self.pending.len() as u32).to_le_bytes());
        buf.extend_from_slice(&blobs_len.to_le_bytes());
        buf.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());

        let mut entries = Vec::with_capacity(self.pending.len());
        let mut offset = start + SEGMENT_HEADER_SIZE;
        for (hash, bytes) in &self.pending {
            buf.extend_from_slice(bytes);
            entries.push((
                *hash,
                IndexEntry {
                    offset,
                    size: bytes.len() as u32,
                },
            ));
            offset += bytes.len() as u64;
        }
        for (hash, entry) in &entries {
            buf.extend_from_slice(hash.as_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.size.to_le_bytes());
        }
        buf.extend_from_slice(&meta_bytes);

        // Segment first, header second: a crash in between leaves the old
        // committed length in place.
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(&buf)?;
        self.file.sync_data()?;

        let map = map_prefix(&self.file, end)?;
        let segments = previous.segments + 1;

        self.file.seek(SeekFrom::Start(16))?;
        self.file.write_all(&end.to_le_bytes())?;
        self.file.write_all(&segments.to_le_bytes())?;
        self.file.sync_data()?;

        {
            let mut index = self.store.index.write();
            for (hash, entry) in &entries {
                index.insert(*hash, *entry);
            }
        }

        let meta = self.meta.take().or_else(|| previous.meta.clone());
        *self.store.snapshot.write() = Arc::new(Snapshot {
            len: end,
            segments,
            map,
            meta,
        });

        let stats = CommitStats {
            entries: entries.len(),
            bytes: segment_len,
        };
        debug!(
            entries = stats.entries,
            bytes = stats.bytes,
            segment = segments,
            "committed write transaction"
        );
        Ok(stats)
    }
}

fn create_file(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    // flags: 0
    header[16..24].copy_from_slice(&HEADER_SIZE.to_le_bytes());
    // segment_count: 0
    file.write_all(&header)?;
    file.sync_all()?;

    debug!(path = %path.display(), "created node store file");
    Ok(file)
}

fn read_header(file: &mut File) -> Result<(u64, u64)> {
    let mut header = [0u8; HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    if &header[0..8] != MAGIC {
        return Err(Error::InvalidFile("Invalid magic bytes".into()));
    }

    let version = read_u32(&header, 8)?;
    if version != VERSION {
        return Err(Error::VersionMismatch {
            expected: VERSION,
            found: version,
        });
    }

    let committed_len = read_u64(&header, 16)?;
    if committed_len < HEADER_SIZE {
        return Err(Error::Corruption(format!(
            "committed length {committed_len} shorter than header"
        )));
    }
    Ok((committed_len, read_u64(&header, 24)?))
}

fn map_prefix(file: &File, len: u64) -> Result<Mmap> {
    // SAFETY: the mapped prefix is only ever appended after, never rewritten
    // in place, except for the header which readers do not access.
    let map = unsafe { MmapOptions::new().len(len as usize).map(file)? };
    Ok(map)
}

type Scanned = (HashMap<Hash, IndexEntry>, Option<TreeMeta>, u64);

fn scan_segments(map: &[u8], committed_len: u64) -> Result<Scanned> {
    let mut index = HashMap::new();
    let mut meta = None;
    let mut segments = 0u64;
    let mut pos = HEADER_SIZE;

    while pos < committed_len {
        let base = pos as usize;
        if pos + SEGMENT_HEADER_SIZE > committed_len || &map[base..base + 4] != SEGMENT_MAGIC {
            return Err(Error::Corruption(format!("bad segment header at {pos}")));
        }
        let entry_count = read_u32(map, base + 4)? as u64;
        let blobs_len = read_u64(map, base + 8)?;
        let meta_len = read_u32(map, base + 16)? as u64;

        let index_start = pos + SEGMENT_HEADER_SIZE + blobs_len;
        let meta_start = index_start + entry_count * INDEX_ENTRY_SIZE;
        let next = meta_start + meta_len;
        if next > committed_len {
            return Err(Error::Corruption(format!("segment at {pos} overruns file")));
        }

        for i in 0..entry_count {
            let at = (index_start + i * INDEX_ENTRY_SIZE) as usize;
            let mut hash_bytes = [0u8; 32];
            hash_bytes.copy_from_slice(&map[at..at + 32]);
            let entry = IndexEntry {
                offset: read_u64(map, at + 32)?,
                size: read_u32(map, at + 40)?,
            };
            index.insert(Hash::from_bytes(hash_bytes), entry);
        }

        if meta_len > 0 {
            meta = Some(bincode::deserialize(
                &map[meta_start as usize..next as usize],
            )?);
        }

        segments += 1;
        pos = next;
    }

    Ok((index, meta, segments))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::Corruption(format!("short read at {at}")))
}

fn read_u64(buf: &[u8], at: usize) -> Result<u64> {
    buf.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::Corruption(format!("short read at {at}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta(root: Hash, size: u64) -> TreeMeta {
        TreeMeta {
            name: "test".into(),
            depth: 4,
            hash_policy: "blake3".into(),
            root,
            size,
        }
    }

    fn raw(data: &[u8]) -> Blob {
        Blob::new(BlobType::Raw, data.to_vec())
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), "test");

        {
            let store = NodeStore::open(config.clone()).unwrap();
            assert_eq!(store.object_count(), 0);
            assert!(store.meta().is_none());
            assert!(store.path().ends_with("test/nodes.db"));
        }

        {
            let store = NodeStore::open(config).unwrap();
            assert_eq!(store.object_count(), 0);
            assert_eq!(store.segment_count(), 0);
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let store = NodeStore::open(StoreConfig::new(dir.path(), "test")).unwrap();

        let node = NodeData::new(Hash::from_u64(1), Hash::from_u64(2));
        let hash = Hash::digest(b"node");
        let mut tx = store.begin_write_transaction().unwrap();
        assert!(tx.put_node(hash, &node).unwrap());
        tx.set_meta(meta(hash, 2));
        let stats = tx.commit().unwrap();
        assert_eq!(stats.entries, 1);

        let read = store.begin_read_transaction().unwrap();
        assert_eq!(read.get_node(&hash).unwrap(), Some(node));
        assert_eq!(read.meta().map(|m| m.size), Some(2));
        assert!(read.get(&Hash::digest(b"missing")).unwrap().is_none());
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), "test");
        let hash = Hash::digest(b"persistent");

        {
            let store = NodeStore::open(config.clone()).unwrap();
            let mut tx = store.begin_write_transaction().unwrap();
            tx.put(hash, &raw(b"persistent payload")).unwrap();
            tx.set_meta(meta(hash, 7));
            tx.commit().unwrap();
        }

        {
            let store = NodeStore::open(config).unwrap();
            assert_eq!(store.get(&hash).unwrap().unwrap(), b"persistent payload");
            assert_eq!(store.meta().unwrap().size, 7);
            assert_eq!(store.segment_count(), 1);
        }
    }

    #[test]
    fn test_deduplication() {
        let dir = tempdir().unwrap();
        let store = NodeStore::open(StoreConfig::new(dir.path(), "test")).unwrap();
        let hash = Hash::digest(b"dup");

        let mut tx = store.begin_write_transaction().unwrap();
        assert!(tx.put(hash, &raw(b"duplicate data")).unwrap());
        assert!(!tx.put(hash, &raw(b"duplicate data")).unwrap());
        tx.commit().unwrap();

        let mut tx = store.begin_write_transaction().unwrap();
        assert_eq!(tx.put_batch(vec![(hash, raw(b"duplicate data"))]).unwrap(), 0);
        tx.commit().unwrap();

        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn test_snapshot_isolation() {
        let dir = tempdir().unwrap();
        let store = NodeStore::open(StoreConfig::new(dir.path(), "test")).unwrap();
        let first = Hash::digest(b"first");
        let second = Hash::digest(b"second");

        let mut tx = store.begin_write_transaction().unwrap();
        tx.put(first, &raw(b"1")).unwrap();
        tx.set_meta(meta(first, 1));
        tx.commit().unwrap();

        let old = store.begin_read_transaction().unwrap();

        let mut tx = store.begin_write_transaction().unwrap();
        tx.put(second, &raw(b"2")).unwrap();
        tx.set_meta(meta(second, 2));
        tx.commit().unwrap();

        assert!(old.contains(&first));
        assert!(!old.contains(&second));
        assert_eq!(old.meta().unwrap().size, 1);

        let new = store.begin_read_transaction().unwrap();
        assert!(new.contains(&second));
        assert_eq!(new.meta().unwrap().size, 2);
    }

    #[test]
    fn test_dropped_write_transaction_aborts() {
        let dir = tempdir().unwrap();
        let store = NodeStore::open(StoreConfig::new(dir.path(), "test")).unwrap();
        let hash = Hash::digest(b"aborted");

        {
            let mut tx = store.begin_write_transaction().unwrap();
            tx.put(hash, &raw(b"never")).unwrap();
        }

        assert!(!store.contains(&hash));
        assert_eq!(store.committed_len(), HEADER_SIZE);
    }

    #[test]
    fn test_single_writer() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), "test")
            .with_write_lock_timeout(Duration::from_millis(10));
        let store = NodeStore::open(config).unwrap();

        let _held = store.begin_write_transaction().unwrap();
        assert!(matches!(store.begin_write_transaction(), Err(Error::Locked)));
    }

    #[test]
    fn test_readers_full() {
        let dir = tempdir().unwrap();
        let store =
            NodeStore::open(StoreConfig::new(dir.path(), "test").with_max_readers(2)).unwrap();

        let a = store.begin_read_transaction().unwrap();
        let _b = store.begin_read_transaction().unwrap();
        assert!(matches!(
            store.begin_read_transaction(),
            Err(Error::ReadersFull { max: 2 })
        ));

        drop(a);
        assert!(store.begin_read_transaction().is_ok());
    }

    #[test]
    fn test_store_full_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let store =
            NodeStore::open(StoreConfig::new(dir.path(), "test").with_max_size(128)).unwrap();

        let mut tx = store.begin_write_transaction().unwrap();
        tx.put(Hash::digest(b"big"), &raw(&[1u8; 200])).unwrap();
        assert!(matches!(tx.commit(), Err(Error::StoreFull { .. })));

        assert_eq!(store.object_count(), 0);
        assert_eq!(store.committed_len(), HEADER_SIZE);
    }

    #[test]
    fn test_torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), "test");
        let hash = Hash::digest(b"kept");

        let path = {
            let store = NodeStore::open(config.clone()).unwrap();
            let mut tx = store.begin_write_transaction().unwrap();
            tx.put(hash, &raw(b"kept")).unwrap();
            tx.commit().unwrap();
            store.path().to_path_buf()
        };

        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"SEG1 half written garbage").unwrap();
        }

        let store = NodeStore::open(config).unwrap();
        assert_eq!(store.get(&hash).unwrap().unwrap(), b"kept");
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            store.committed_len()
        );
    }

    #[test]
    fn test_invalid_magic() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path(), "test");
        let path = NodeStore::open(config.clone()).unwrap().path().to_path_buf();

        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(matches!(NodeStore::open(config), Err(Error::InvalidFile(_))));
    }
}
