//! Storage collaborators holding tree nodes by identifier.
//!
//! The tree never keeps nodes in memory between operations: it loads them
//! through a [`NodeStore`] and writes them back when an operation commits.
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: a hash map of nodes
//! - [`DiskStore`]: fixed-size checksummed pages in a file behind an LRU cache

mod disk_store;
mod memory_store;
mod page_cache;

pub use disk_store::{DiskStore, DiskStoreConfig, StoreStats};
pub use memory_store::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::errors::{NodeId, SpatialResult};
use crate::geometry::Bounds;
use crate::node::Node;

/// Tree metadata persisted alongside the nodes so a tree can be reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub config: IndexConfig,
    pub root: NodeId,
    pub entry_count: u64,
    /// `root.level + 1`
    pub height: u32,
    pub node_count: u64,
}

/// Identifier-addressed node storage.
///
/// Failures are reported as storage errors (`Io`, `Serialization`,
/// `NodeNotFound`, `Corrupted`) and propagated unchanged by the tree.
pub trait NodeStore<B: Bounds> {
    fn load_node(&self, id: NodeId) -> SpatialResult<Node<B>>;

    /// Writes `node` under `id`, allocating a fresh identifier when `id` is `None`.
    fn store_node(&mut self, id: Option<NodeId>, node: &Node<B>) -> SpatialResult<NodeId>;

    fn delete_node(&mut self, id: NodeId) -> SpatialResult<()>;

    /// Fails if `node` could not be written under `id`, without writing it.
    ///
    /// A commit checks every staged node before storing the first one.
    fn check_node(&self, _id: NodeId, _node: &Node<B>) -> SpatialResult<()> {
        Ok(())
    }

    /// Reserves an identifier for a node that will be stored later.
    fn new_identifier(&mut self) -> SpatialResult<NodeId>;

    /// Returns an identifier obtained from
    /// [`new_identifier`](Self::new_identifier) that was never stored.
    fn release_identifier(&mut self, id: NodeId) -> SpatialResult<()>;

    fn load_header(&self) -> SpatialResult<Option<TreeHeader>>;

    fn store_header(&mut self, header: &TreeHeader) -> SpatialResult<()>;

    fn flush(&mut self) -> SpatialResult<()> {
        Ok(())
    }
}

impl<B: Bounds, S: NodeStore<B> + ?Sized> NodeStore<B> for Box<S> {
    fn load_node(&self, id: NodeId) -> SpatialResult<Node<B>> {
        (**self).load_node(id)
    }

    fn store_node(&mut self, id: Option<NodeId>, node: &Node<B>) -> SpatialResult<NodeId> {
        (**self).store_node(id, node)
    }

    fn delete_node(&mut self, id: NodeId) -> SpatialResult<()> {
        (**self).delete_node(id)
    }

    fn check_node(&self, id: NodeId, node: &Node<B>) -> SpatialResult<()> {
        (**self).check_node(id, node)
    }

    fn new_identifier(&mut self) -> SpatialResult<NodeId> {
        (**self).new_identifier()
    }

    fn release_identifier(&mut self, id: NodeId) -> SpatialResult<()> {
        (**self).release_identifier(id)
    }

    fn load_header(&self) -> SpatialResult<Option<TreeHeader>> {
        (**self).load_header()
    }

    fn store_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        (**self).store_header(header)
    }

    fn flush(&mut self) -> SpatialResult<()> {
        (**self).flush()
    }
}
