//! LRU cache for disk store pages.
//!
//! Pages are only loaded when first accessed. A dirty page carries its encoded
//! bytes so that eviction can write it back without re-encoding.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::errors::NodeId;
use crate::node::Node;

/// A cached page with its data and, when dirty, the encoded bytes to write back
pub(crate) struct CachedPage<B> {
    pub node: Node<B>,
    pub pending: Option<Vec<u8>>,
}

/// LRU cache for store pages
pub(crate) struct PageCache<B> {
    pages: LruCache<NodeId, CachedPage<B>>,
}

impl<B> PageCache<B> {
    /// Create a new page cache with specified maximum size
    pub fn new(max_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(max_pages.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: LruCache::new(capacity),
        }
    }

    /// Get a page from cache, updating LRU order.
    pub fn get(&mut self, id: NodeId) -> Option<&Node<B>> {
        self.pages.get(&id).map(|cached| &cached.node)
    }

    /// Insert a page, returning the evicted least recently used page if the
    /// cache was full. Replacing a cached page is not an eviction.
    pub fn insert(&mut self, id: NodeId, page: CachedPage<B>) -> Option<(NodeId, CachedPage<B>)> {
        match self.pages.push(id, page) {
            Some((evicted, old)) if evicted != id => Some((evicted, old)),
            _ => None,
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<CachedPage<B>> {
        self.pages.pop(&id)
    }

    /// Takes the pending bytes of every dirty page, leaving the pages clean.
    pub fn take_dirty(&mut self) -> Vec<(NodeId, Vec<u8>)> {
        let mut dirty: Vec<(NodeId, Vec<u8>)> = self
            .pages
            .iter_mut()
            .filter_map(|(id, cached)| cached.pending.take().map(|bytes| (*id, bytes)))
            .collect();
        dirty.sort_by_key(|(id, _)| *id);
        dirty
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.pages.contains(&id)
    }
}
