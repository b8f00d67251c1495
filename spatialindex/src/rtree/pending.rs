//! Write set staging the node changes of one tree operation.
//!
//! Every mutating operation runs against a [`Mutation`]: nodes are read through
//! it, and writes and deletions are only recorded. On success the staged
//! changes and the updated header are committed to the store in one pass; on
//! failure they are discarded and freshly allocated identifiers are released,
//! so the stored tree is exactly as it was before the call.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use crate::config::IndexConfig;
use crate::errors::{NodeId, SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::node::Node;
use crate::stats::Counters;
use crate::storage::{NodeStore, TreeHeader};

/// A node on the descent path, with the position of the child followed.
pub(crate) struct PathStep<B> {
    pub id: NodeId,
    pub node: Node<B>,
    pub child: usize,
}

pub(crate) struct Mutation<'a, B: Bounds, S: NodeStore<B>> {
    store: &'a mut S,
    pub(crate) counters: &'a Counters,
    /// Working copy of the tree header, committed with the nodes.
    pub(crate) header: TreeHeader,
    writes: BTreeMap<NodeId, Node<B>>,
    deletes: BTreeSet<NodeId>,
    /// Identifiers allocated by this operation.
    allocated: BTreeSet<NodeId>,
    /// Allocated identifiers whose node was removed again before commit.
    released: Vec<NodeId>,
}

impl<'a, B: Bounds, S: NodeStore<B>> Mutation<'a, B, S> {
    pub(crate) fn new(store: &'a mut S, counters: &'a Counters, header: TreeHeader) -> Self {
        Self {
            store,
            counters,
            header,
            writes: BTreeMap::new(),
            deletes: BTreeSet::new(),
            allocated: BTreeSet::new(),
            released: Vec::new(),
        }
    }

    pub(crate) fn config(&self) -> &IndexConfig {
        &self.header.config
    }

    /// Reads a node, seeing the changes staged so far.
    pub(crate) fn load(&self, id: NodeId) -> SpatialResult<Node<B>> {
        if let Some(node) = self.writes.get(&id) {
            return Ok(node.clone());
        }
        if self.deletes.contains(&id) || self.released.contains(&id) {
            return Err(SpatialError::NodeNotFound(id));
        }
        Counters::add(&self.counters.reads, 1);
        self.store.load_node(id)
    }

    pub(crate) fn write(&mut self, id: NodeId, node: Node<B>) {
        self.writes.insert(id, node);
    }

    /// Stages a new node under a freshly allocated identifier.
    pub(crate) fn create(&mut self, node: Node<B>) -> SpatialResult<NodeId> {
        let id = self.store.new_identifier()?;
        self.allocated.insert(id);
        self.header.node_count += 1;
        self.writes.insert(id, node);
        Ok(id)
    }

    pub(crate) fn remove(&mut self, id: NodeId) {
        self.writes.remove(&id);
        if self.allocated.remove(&id) {
            self.released.push(id);
        } else {
            self.deletes.insert(id);
        }
        self.header.node_count = self.header.node_count.saturating_sub(1);
    }

    /// Writes the staged changes and the header to the store.
    ///
    /// Every staged node is checked against the store first; a node the store
    /// rejects aborts the mutation before anything is written. A storage
    /// failure while writing is propagated and may leave the store partially
    /// written.
    pub(crate) fn commit(mut self) -> SpatialResult<TreeHeader> {
        let checked: SpatialResult<()> = self
            .writes
            .iter()
            .try_for_each(|(id, node)| self.store.check_node(*id, node));
        if let Err(e) = checked {
            self.abort();
            return Err(e);
        }

        for (id, node) in &self.writes {
            self.store.store_node(Some(*id), node)?;
        }
        Counters::add(&self.counters.writes, self.writes.len() as u64);
        for id in &self.deletes {
            self.store.delete_node(*id)?;
        }
        for id in &self.released {
            self.store.release_identifier(*id)?;
        }
        self.store.store_header(&self.header)?;
        Ok(self.header)
    }

    /// Discards the staged changes.
    pub(crate) fn abort(mut self) {
        for id in self.allocated.iter().chain(&self.released) {
            if let Err(e) = self.store.release_identifier(*id) {
                warn!("Failed to release node identifier {}: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;
    use crate::node::Entry;
    use crate::storage::{DiskStore, DiskStoreConfig, MemoryStore};

    fn leaf(count: i64) -> Node<Region> {
        Node::Leaf {
            entries: (0..count)
                .map(|i| Entry::new(i, Region::point(&[i as f64, 0.0]).unwrap()))
                .collect(),
        }
    }

    fn header() -> TreeHeader {
        TreeHeader {
            config: IndexConfig::default(),
            root: 1,
            entry_count: 0,
            height: 1,
            node_count: 1,
        }
    }

    fn store_with_root() -> MemoryStore<Region> {
        let mut store = MemoryStore::new();
        store.store_node(None, &Node::empty_leaf()).unwrap();
        store.store_header(&header()).unwrap();
        store
    }

    #[test]
    fn test_commit_applies_writes_and_deletes() {
        let mut store = store_with_root();
        let counters = Counters::default();
        let mut m = Mutation::new(&mut store, &counters, header());
        let id = m.create(Node::empty_leaf()).unwrap();
        m.remove(1);
        m.header.root = id;
        assert!(matches!(m.load(1), Err(SpatialError::NodeNotFound(1))));
        let committed = m.commit().unwrap();

        assert_eq!(committed.root, id);
        assert_eq!(committed.node_count, 1);
        assert!(store.contains(id));
        assert!(!store.contains(1));
        assert_eq!(store.load_header().unwrap(), Some(committed));
    }

    #[test]
    fn test_abort_leaves_store_untouched() {
        let mut store = store_with_root();
        let counters = Counters::default();
        let mut m = Mutation::new(&mut store, &counters, header());
        let id = m.create(Node::empty_leaf()).unwrap();
        m.remove(1);
        m.abort();

        assert!(store.contains(1));
        assert!(!store.contains(id));
        assert_eq!(store.len(), 1);
        assert_eq!(store.load_header().unwrap(), Some(header()));
        // the aborted identifier is handed out again
        assert_eq!(store.new_identifier().unwrap(), id);
    }

    #[test]
    fn test_rejected_node_aborts_whole_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiskStoreConfig::default().with_page_size(512);
        let mut store = DiskStore::<Region>::create(dir.path().join("commit.idx"), config).unwrap();
        let counters = Counters::default();

        let mut m = Mutation::new(&mut store, &counters, header());
        let small = m.create(leaf(2)).unwrap();
        let big = m.create(leaf(100)).unwrap();
        assert!(small < big);
        assert!(matches!(m.commit(), Err(SpatialError::Serialization(_))));

        // the node that fit was not written either
        assert!(matches!(store.load_node(small), Err(SpatialError::NodeNotFound(_))));
        assert_eq!(store.load_header().unwrap(), None);
        assert_eq!(store.stats().free_pages, 2);
    }

    #[test]
    fn test_node_created_and_removed_in_one_operation() {
        let mut store = store_with_root();
        let counters = Counters::default();
        let mut m = Mutation::new(&mut store, &counters, header());
        let id = m.create(Node::empty_leaf()).unwrap();
        m.remove(id);
        let committed = m.commit().unwrap();

        assert_eq!(committed.node_count, 1);
        assert!(!store.contains(id));
    }
}
