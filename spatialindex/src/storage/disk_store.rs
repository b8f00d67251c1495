//! Paged file store.
//!
//! Page 0 holds the store header; every other page holds either a node
//! (bincode-encoded and wrapped with a CRC32 checksum) or a link of the free
//! page chain. Nodes are read one page at a time on demand and kept in an LRU
//! cache; modified pages are written back on eviction and on [`flush`].
//!
//! [`flush`]: NodeStore::flush

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::page_cache::{CachedPage, PageCache};
use super::{NodeStore, TreeHeader};
use crate::errors::{NodeId, SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::node::Node;

/// Magic number for file format identification
const MAGIC: u32 = 0x5354_5258; // "STRX"

/// File format version
const VERSION: u32 = 1;

/// Default page size (16KB)
pub const DEFAULT_PAGE_SIZE: usize = 16384;

/// Default cache size in number of pages (16MB with 16KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Smallest page able to hold the store header.
const MIN_PAGE_SIZE: usize = 512;

/// Disk store parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStoreConfig {
    pub page_size: usize,
    pub cache_pages: usize,
}

impl Default for DiskStoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

impl DiskStoreConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }
}

/// Cache and I/O counters of a [`DiskStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub cached_pages: u64,
    pub free_pages: u64,
}

// ============================================================================
// On-disk records
// ============================================================================

/// Store header kept in page 0
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileHeader {
    magic: u32,
    version: u32,
    page_size: u32,
    next_page_id: NodeId,
    /// Head of the free page chain (0 = empty)
    free_list_head: NodeId,
    free_page_count: u64,
    tree: Option<TreeHeader>,
}

impl FileHeader {
    fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            next_page_id: 1,
            free_list_head: 0,
            free_page_count: 0,
            tree: None,
        }
    }

    fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::Corrupted(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != VERSION {
            return Err(SpatialError::Corrupted(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        if (self.page_size as usize) < MIN_PAGE_SIZE {
            return Err(SpatialError::Corrupted(format!(
                "Invalid page size {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Encoded node bytes with a CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageWithChecksum {
    checksum: u32,
    data: Vec<u8>,
}

impl PageWithChecksum {
    fn new(data: Vec<u8>) -> Self {
        Self {
            checksum: crc32(&data),
            data,
        }
    }

    /// Verify checksum and consume self to return the node bytes
    fn into_data(self, id: NodeId) -> SpatialResult<Vec<u8>> {
        let expected = crc32(&self.data);
        if self.checksum != expected {
            return Err(SpatialError::Corrupted(format!(
                "Page {} checksum mismatch (expected: {:x}, got: {:x})",
                id, expected, self.checksum
            )));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Page {
    Node(PageWithChecksum),
    /// A free page in the free list chain (0 = end of chain)
    Free { next_free: NodeId },
}

/// CRC32-MPEG2
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}

fn encode<T: Serialize>(value: &T) -> SpatialResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SpatialResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

// ============================================================================
// DiskStore
// ============================================================================

struct DiskInner<B> {
    file: File,
    cache: PageCache<B>,
    header: FileHeader,
    header_dirty: bool,
}

/// Node store backed by a paged file.
///
/// # Examples
///
/// ```rust,no_run
/// use spatialindex::{DiskStore, DiskStoreConfig, IndexConfig, RTree, Region};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = DiskStore::<Region>::create("places.idx", DiskStoreConfig::default())?;
/// let mut tree = RTree::create(store, IndexConfig::new(2))?;
/// tree.flush()?;
///
/// let reopened = RTree::open(DiskStore::<Region>::open("places.idx", DiskStoreConfig::default())?)?;
/// assert_eq!(reopened.len(), tree.len());
/// # Ok(())
/// # }
/// ```
pub struct DiskStore<B: Bounds> {
    inner: Mutex<DiskInner<B>>,
    path: PathBuf,
    page_size: usize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    _bounds: PhantomData<fn() -> B>,
}

impl<B: Bounds> DiskStore<B> {
    /// Creates a new, empty store file, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, config: DiskStoreConfig) -> SpatialResult<Self> {
        if config.page_size < MIN_PAGE_SIZE || config.page_size > u32::MAX as usize {
            return Err(SpatialError::InvalidOperation(format!(
                "page size must be between {} and {} bytes, got {}",
                MIN_PAGE_SIZE,
                u32::MAX,
                config.page_size
            )));
        }
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let store = Self::from_parts(file, path, FileHeader::new(config.page_size), config);
        {
            let mut inner = store.inner.lock();
            store.write_header(&mut inner)?;
            inner.file.sync_all()?;
        }
        debug!(
            "Created disk store at {:?} (page size {})",
            path, config.page_size
        );
        Ok(store)
    }

    /// Opens an existing store file. Only the header is read; nodes are loaded
    /// on demand. The page size recorded in the file takes precedence over
    /// `config.page_size`.
    pub fn open(path: impl AsRef<Path>, config: DiskStoreConfig) -> SpatialResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buffer = vec![0u8; MIN_PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let header: FileHeader = decode(&buffer)?;
        header.validate()?;

        let config = config.with_page_size(header.page_size as usize);
        debug!(
            "Opened disk store at {:?} ({} pages, {} free)",
            path, header.next_page_id, header.free_page_count
        );
        Ok(Self::from_parts(file, path, header, config))
    }

    fn from_parts(file: File, path: &Path, header: FileHeader, config: DiskStoreConfig) -> Self {
        Self {
            inner: Mutex::new(DiskInner {
                file,
                cache: PageCache::new(config.cache_pages),
                header,
                header_dirty: false,
            }),
            path: path.to_path_buf(),
            page_size: config.page_size,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            disk_reads: AtomicU64::new(0),
            disk_writes: AtomicU64::new(0),
            _bounds: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            cached_pages: inner.cache.len() as u64,
            free_pages: inner.header.free_page_count,
        }
    }

    fn check_page_id(&self, id: NodeId) -> SpatialResult<()> {
        if id == 0 {
            return Err(SpatialError::InvalidOperation(
                "page 0 is reserved for the store header".into(),
            ));
        }
        Ok(())
    }

    fn write_header(&self, inner: &mut DiskInner<B>) -> SpatialResult<()> {
        let bytes = encode(&inner.header)?;
        self.write_raw(&mut inner.file, 0, bytes)?;
        inner.header_dirty = false;
        Ok(())
    }

    fn write_raw(&self, file: &mut File, id: NodeId, mut bytes: Vec<u8>) -> SpatialResult<()> {
        if bytes.len() > self.page_size {
            return Err(SpatialError::Serialization(format!(
                "Page {} too large: {} bytes (max {})",
                id,
                bytes.len(),
                self.page_size
            )));
        }
        bytes.resize(self.page_size, 0);
        file.seek(SeekFrom::Start(id * self.page_size as u64))?;
        file.write_all(&bytes)?;
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_page(&self, file: &mut File, id: NodeId) -> SpatialResult<Page> {
        let mut buffer = vec![0u8; self.page_size];
        file.seek(SeekFrom::Start(id * self.page_size as u64))?;
        file.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SpatialError::NodeNotFound(id)
            } else {
                SpatialError::Io(e)
            }
        })?;
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        decode(&buffer)
    }

    fn encode_node(&self, id: NodeId, node: &Node<B>) -> SpatialResult<Vec<u8>> {
        let page = Page::Node(PageWithChecksum::new(encode(node)?));
        let bytes = encode(&page)?;
        if bytes.len() > self.page_size {
            return Err(SpatialError::Serialization(format!(
                "Node {} too large: {} bytes (max {})",
                id,
                bytes.len(),
                self.page_size
            )));
        }
        Ok(bytes)
    }

    fn cache_page(&self, inner: &mut DiskInner<B>, id: NodeId, page: CachedPage<B>) -> SpatialResult<()> {
        if let Some((evicted, old)) = inner.cache.insert(id, page) {
            if let Some(bytes) = old.pending {
                self.write_raw(&mut inner.file, evicted, bytes)?;
            }
        }
        Ok(())
    }

    fn allocate(&self, inner: &mut DiskInner<B>) -> SpatialResult<NodeId> {
        let head = inner.header.free_list_head;
        if head != 0 {
            let next = match self.read_page(&mut inner.file, head)? {
                Page::Free { next_free } => next_free,
                Page::Node(_) => {
                    return Err(SpatialError::Corrupted(format!(
                        "free list head {} is an occupied page",
                        head
                    )))
                }
            };
            inner.header.free_list_head = next;
            inner.header.free_page_count = inner.header.free_page_count.saturating_sub(1);
            inner.header_dirty = true;
            return Ok(head);
        }
        let id = inner.header.next_page_id;
        inner.header.next_page_id += 1;
        inner.header_dirty = true;
        Ok(id)
    }

    fn free(&self, inner: &mut DiskInner<B>, id: NodeId) -> SpatialResult<()> {
        inner.cache.remove(id);
        let link = encode(&Page::Free {
            next_free: inner.header.free_list_head,
        })?;
        self.write_raw(&mut inner.file, id, link)?;
        inner.header.free_list_head = id;
        inner.header.free_page_count += 1;
        inner.header_dirty = true;
        Ok(())
    }
}

impl<B: Bounds> NodeStore<B> for DiskStore<B> {
    fn load_node(&self, id: NodeId) -> SpatialResult<Node<B>> {
        self.check_page_id(id)?;
        let mut inner = self.inner.lock();
        if let Some(node) = inner.cache.get(id) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node.clone());
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        if id >= inner.header.next_page_id {
            return Err(SpatialError::NodeNotFound(id));
        }

        let node: Node<B> = match self.read_page(&mut inner.file, id)? {
            Page::Node(page) => decode(&page.into_data(id)?)?,
            Page::Free { .. } => return Err(SpatialError::NodeNotFound(id)),
        };
        self.cache_page(
            &mut inner,
            id,
            CachedPage {
                node: node.clone(),
                pending: None,
            },
        )?;
        Ok(node)
    }

    fn store_node(&mut self, id: Option<NodeId>, node: &Node<B>) -> SpatialResult<NodeId> {
        let mut inner = self.inner.lock();
        let id = match id {
            Some(id) => {
                self.check_page_id(id)?;
                id
            }
            None => self.allocate(&mut inner)?,
        };
        let bytes = self.encode_node(id, node)?;
        self.cache_page(
            &mut inner,
            id,
            CachedPage {
                node: node.clone(),
                pending: Some(bytes),
            },
        )?;
        Ok(id)
    }

    fn delete_node(&mut self, id: NodeId) -> SpatialResult<()> {
        self.check_page_id(id)?;
        let mut inner = self.inner.lock();
        if !inner.cache.contains(id) {
            if id >= inner.header.next_page_id {
                return Err(SpatialError::NodeNotFound(id));
            }
            if let Page::Free { .. } = self.read_page(&mut inner.file, id)? {
                return Err(SpatialError::NodeNotFound(id));
            }
        }
        self.free(&mut inner, id)
    }

    fn check_node(&self, id: NodeId, node: &Node<B>) -> SpatialResult<()> {
        self.check_page_id(id)?;
        self.encode_node(id, node).map(|_| ())
    }

    fn new_identifier(&mut self) -> SpatialResult<NodeId> {
        let mut inner = self.inner.lock();
        self.allocate(&mut inner)
    }

    fn release_identifier(&mut self, id: NodeId) -> SpatialResult<()> {
        self.check_page_id(id)?;
        let mut inner = self.inner.lock();
        self.free(&mut inner, id)
    }

    fn load_header(&self) -> SpatialResult<Option<TreeHeader>> {
        Ok(self.inner.lock().header.tree.clone())
    }

    fn store_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        inner.header.tree = Some(header.clone());
        inner.header_dirty = true;
        Ok(())
    }

    /// Writes back every dirty page and the header, then syncs the file.
    fn flush(&mut self) -> SpatialResult<()> {
        let mut inner = self.inner.lock();
        let dirty = inner.cache.take_dirty();
        let written = dirty.len();
        for (id, bytes) in dirty {
            self.write_raw(&mut inner.file, id, bytes)?;
        }
        if written > 0 || inner.header_dirty {
            self.write_header(&mut inner)?;
            inner.file.sync_all()?;
        }
        debug!("Flushed {} pages to {:?}", written, self.path);
        Ok(())
    }
}

impl<B: Bounds> Drop for DiskStore<B> {
    fn drop(&mut self) {
        if let Err(e) = NodeStore::<B>::flush(self) {
            warn!("Failed to flush disk store {:?} on drop: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::geometry::Region;
    use crate::node::Entry;
    use tempfile::tempdir;

    fn leaf(ids: &[i64]) -> Node<Region> {
        Node::Leaf {
            entries: ids
                .iter()
                .map(|i| Entry::new(*i, Region::point(&[*i as f64, 0.0]).unwrap()))
                .collect(),
        }
    }

    #[test]
    fn test_store_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");

        let id = {
            let mut store = DiskStore::<Region>::create(&path, DiskStoreConfig::default()).unwrap();
            let id = store.store_node(None, &leaf(&[1, 2, 3])).unwrap();
            store.flush().unwrap();
            id
        };

        let store = DiskStore::<Region>::open(&path, DiskStoreConfig::default()).unwrap();
        assert_eq!(store.load_node(id).unwrap(), leaf(&[1, 2, 3]));
    }

    #[test]
    fn test_page_zero_rejected() {
        let dir = tempdir().unwrap();
        let mut store =
            DiskStore::<Region>::create(dir.path().join("test.idx"), DiskStoreConfig::default())
                .unwrap();
        assert!(store.store_node(Some(0), &leaf(&[])).is_err());
        assert!(store.load_node(0).is_err());
    }

    #[test]
    fn test_dirty_pages_written_on_eviction() {
        let dir = tempdir().unwrap();
        let config = DiskStoreConfig::default().with_cache_pages(2);
        let mut store = DiskStore::<Region>::create(dir.path().join("test.idx"), config).unwrap();

        let ids: Vec<NodeId> = (0..5)
            .map(|i| store.store_node(None, &leaf(&[i])).unwrap())
            .collect();
        assert_eq!(store.stats().cached_pages, 2);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.load_node(*id).unwrap(), leaf(&[i as i64]));
        }
        let stats = store.stats();
        assert!(stats.cache_misses >= 3);
        assert!(stats.disk_reads >= 3);
    }

    #[test]
    fn test_deleted_pages_are_reused() {
        let dir = tempdir().unwrap();
        let mut store =
            DiskStore::<Region>::create(dir.path().join("test.idx"), DiskStoreConfig::default())
                .unwrap();
        let a = store.store_node(None, &leaf(&[1])).unwrap();
        let b = store.store_node(None, &leaf(&[2])).unwrap();
        store.delete_node(a).unwrap();
        assert_eq!(store.stats().free_pages, 1);
        assert!(matches!(store.load_node(a), Err(SpatialError::NodeNotFound(_))));
        assert!(matches!(store.delete_node(a), Err(SpatialError::NodeNotFound(_))));

        assert_eq!(store.new_identifier().unwrap(), a);
        assert_eq!(store.stats().free_pages, 0);
        assert_eq!(store.load_node(b).unwrap(), leaf(&[2]));
    }

    #[test]
    fn test_oversized_node_rejected() {
        let dir = tempdir().unwrap();
        let config = DiskStoreConfig::default().with_page_size(MIN_PAGE_SIZE);
        let mut store = DiskStore::<Region>::create(dir.path().join("test.idx"), config).unwrap();
        let big: Vec<i64> = (0..100).collect();
        assert!(matches!(
            store.check_node(1, &leaf(&big)),
            Err(SpatialError::Serialization(_))
        ));
        assert!(matches!(
            store.store_node(None, &leaf(&big)),
            Err(SpatialError::Serialization(_))
        ));
        store.check_node(1, &leaf(&[1, 2])).unwrap();
        assert!(store.check_node(0, &leaf(&[1])).is_err());
    }

    #[test]
    fn test_corrupted_page_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let id = {
            let mut store = DiskStore::<Region>::create(&path, DiskStoreConfig::default()).unwrap();
            let id = store.store_node(None, &leaf(&[7, 8])).unwrap();
            store.flush().unwrap();
            id
        };

        // flip the last byte of the node payload
        {
            let page = PageWithChecksum::new(encode(&leaf(&[7, 8])).unwrap());
            let bytes = encode(&Page::Node(page)).unwrap();
            let offset = id * DEFAULT_PAGE_SIZE as u64 + bytes.len() as u64 - 1;
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(offset)).unwrap();
            file.write_all(&[0xAB]).unwrap();
        }

        let store = DiskStore::<Region>::open(&path, DiskStoreConfig::default()).unwrap();
        assert!(matches!(store.load_node(id), Err(SpatialError::Corrupted(_))));
    }

    #[test]
    fn test_tree_header_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let header = TreeHeader {
            config: IndexConfig::new(3),
            root: 4,
            entry_count: 100,
            height: 3,
            node_count: 9,
        };
        {
            let mut store = DiskStore::<Region>::create(&path, DiskStoreConfig::default()).unwrap();
            store.store_header(&header).unwrap();
        }
        let store = DiskStore::<Region>::open(&path, DiskStoreConfig::default()).unwrap();
        assert_eq!(store.load_header().unwrap(), Some(header));
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.idx");
        std::fs::write(&path, vec![0xFFu8; MIN_PAGE_SIZE]).unwrap();
        assert!(DiskStore::<Region>::open(&path, DiskStoreConfig::default()).is_err());
    }
}
