use std::marker::PhantomData;

use log::debug;

use super::bulk_load::drain;
use super::insert::require_region;
use super::pending::Mutation;
use super::search::MatchMode;
use crate::config::IndexConfig;
use crate::errors::{EntryId, NodeId, SpatialError, SpatialResult};
use crate::geometry::{Bounds, MovingRegion, Region};
use crate::node::{Entry, Node};
use crate::query::{FullSpace, Query};
use crate::stats::{Counters, Statistics};
use crate::storage::{NodeStore, TreeHeader};
use crate::stream::DataStream;
use crate::visitor::{BoundsVisitor, CountVisitor, IdVisitor, Visitor};

/// A balanced multi-way tree over bounding regions of type `B`, holding its
/// nodes in the store `S`.
///
/// Only the header (root identifier, counts, configuration) lives in the tree
/// value; every node is loaded from the store when an operation needs it.
/// Mutating operations are staged and committed to the store only when they
/// succeed, so a failed call leaves the stored tree unchanged.
///
/// # Example
///
/// ```rust
/// use spatialindex::{Entry, IndexConfig, MemoryStore, RTree, Region};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut tree = RTree::create(MemoryStore::new(), IndexConfig::new(2))?;
/// tree.insert(Entry::new(1, Region::new(vec![0.0, 0.0], vec![1.0, 1.0])?))?;
/// tree.insert(Entry::new(2, Region::new(vec![5.0, 5.0], vec![6.0, 6.0])?))?;
///
/// let hits = tree.ids(&Region::new(vec![0.5, 0.5], vec![2.0, 2.0])?)?;
/// assert_eq!(hits, vec![1]);
/// # Ok(())
/// # }
/// ```
pub struct RTree<B: Bounds, S: NodeStore<B>> {
    store: S,
    header: TreeHeader,
    pub(super) counters: Counters,
    _marker: PhantomData<B>,
}

/// Tree of moving objects queried over time windows.
pub type TprTree<S> = RTree<MovingRegion, S>;

impl<B: Bounds, S: NodeStore<B>> RTree<B, S> {
    /// Creates an empty tree in `store`.
    ///
    /// Fails with `CapacityMisconfigured` for an invalid configuration and with
    /// `InvalidOperation` if the store already holds a tree.
    pub fn create(store: S, config: IndexConfig) -> SpatialResult<Self> {
        let mut tree = Self::unbuilt(store, config)?;
        tree.mutate(|m| {
            m.header.root = m.create(Node::empty_leaf())?;
            Ok(())
        })?;
        debug!(
            "Created {}-dimensional tree with capacity {}",
            tree.dimension(),
            tree.config().capacity
        );
        Ok(tree)
    }

    /// Opens the tree persisted in `store`.
    ///
    /// Only the header is read; nodes stay in the store until accessed.
    pub fn open(store: S) -> SpatialResult<Self> {
        let header = store
            .load_header()?
            .ok_or_else(|| SpatialError::InvalidOperation("store holds no tree".into()))?;
        header.config.validate()?;
        debug!(
            "Opened tree with {} entries (height {}, {} nodes)",
            header.entry_count, header.height, header.node_count
        );
        Ok(Self {
            store,
            header,
            counters: Counters::default(),
            _marker: PhantomData,
        })
    }

    /// Builds a tree in `store` bottom-up from every entry of `stream`.
    ///
    /// The stream is read to exhaustion; `size` and `rewind` are never called.
    /// An empty stream yields an empty tree.
    ///
    /// # Example
    ///
    /// ```rust
    /// use spatialindex::{Entry, IndexConfig, IterStream, MemoryStore, RTree, Region};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let entries = (0..100).map(|i| {
    ///     let x = i as f64;
    ///     Entry::new(i, Region::new(vec![x, x], vec![x + 1.0, x + 1.0]).unwrap())
    /// });
    /// let mut stream = IterStream::new(entries);
    /// let tree = RTree::bulk_load(MemoryStore::new(), IndexConfig::new(2), &mut stream)?;
    /// assert_eq!(tree.len(), 100);
    /// # Ok(())
    /// # }
    /// ```
    pub fn bulk_load<D: DataStream<B> + ?Sized>(
        store: S,
        config: IndexConfig,
        stream: &mut D,
    ) -> SpatialResult<Self> {
        let mut tree = Self::unbuilt(store, config)?;
        let entries = drain(stream, tree.dimension())?;
        tree.mutate(|m| m.bulk_build(entries))?;
        Ok(tree)
    }

    /// A tree value whose root has not been stored yet.
    fn unbuilt(store: S, config: IndexConfig) -> SpatialResult<Self> {
        config.validate()?;
        if store.load_header()?.is_some() {
            return Err(SpatialError::InvalidOperation(
                "store already holds a tree".into(),
            ));
        }
        Ok(Self {
            store,
            header: TreeHeader {
                config,
                root: 0,
                entry_count: 0,
                height: 1,
                node_count: 0,
            },
            counters: Counters::default(),
            _marker: PhantomData,
        })
    }

    /// Runs `f` against a staged copy of the tree, committing on success.
    fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut Mutation<'_, B, S>) -> SpatialResult<T>,
    ) -> SpatialResult<T> {
        let mut mutation = Mutation::new(&mut self.store, &self.counters, self.header.clone());
        match f(&mut mutation) {
            Ok(value) => {
                self.header = mutation.commit()?;
                Ok(value)
            }
            Err(e) => {
                mutation.abort();
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.header.config
    }

    pub fn dimension(&self) -> usize {
        self.header.config.dimension
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.header.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// `root level + 1`; an empty tree has height 1.
    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn root_id(&self) -> NodeId {
        self.header.root
    }

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    /// Inserts `entry`, splitting or reinserting overflowing nodes.
    ///
    /// Identifiers are not required to be unique; deletion matches on both the
    /// identifier and the region.
    pub fn insert(&mut self, entry: Entry<B>) -> SpatialResult<()> {
        SpatialError::dimension(self.dimension(), entry.region.dimension())?;
        self.mutate(|m| m.insert_entry(entry))
    }

    /// Removes the entry with identifier `id` and exactly `region`, returning it.
    ///
    /// Fails with `EntryNotFound`, leaving the tree untouched, when no such
    /// entry exists.
    pub fn delete(&mut self, id: EntryId, region: &B) -> SpatialResult<Entry<B>> {
        SpatialError::dimension(self.dimension(), region.dimension())?;
        self.mutate(|m| m.delete_entry(id, region))
    }

    /// Replaces the contents of the tree with a bulk load of `stream`.
    ///
    /// The stream is rewound first; a stream that cannot rewind fails with
    /// `Unsupported` and the tree keeps its current contents.
    pub fn reload<D: DataStream<B> + ?Sized>(&mut self, stream: &mut D) -> SpatialResult<()> {
        stream.rewind()?;
        let entries = drain(stream, self.dimension())?;
        let old_nodes = self.node_ids()?;
        self.mutate(|m| {
            for id in old_nodes {
                m.remove(id);
            }
            m.bulk_build(entries)
        })?;
        debug!("Reloaded tree with {} entries", self.len());
        Ok(())
    }

    /// Removes every entry, leaving an empty leaf root.
    pub fn clear(&mut self) -> SpatialResult<()> {
        let old_nodes = self.node_ids()?;
        self.mutate(|m| {
            for id in old_nodes {
                m.remove(id);
            }
            m.header.root = m.create(Node::empty_leaf())?;
            m.header.height = 1;
            m.header.entry_count = 0;
            Ok(())
        })
    }

    /// Visits every entry intersecting `query`.
    pub fn intersects_with<Q, V>(&self, query: &Q, visitor: V) -> SpatialResult<()>
    where
        Q: Query<B> + ?Sized,
        V: Visitor<B>,
    {
        self.traverse(query, MatchMode::Intersects, visitor)
    }

    /// Visits every entry lying inside `query`.
    pub fn contains_what<Q, V>(&self, query: &Q, visitor: V) -> SpatialResult<()>
    where
        Q: Query<B> + ?Sized,
        V: Visitor<B>,
    {
        self.traverse(query, MatchMode::Contains, visitor)
    }

    /// Visits every node and entry of the tree.
    pub fn visit_all<V: Visitor<B>>(&self, visitor: V) -> SpatialResult<()> {
        self.traverse(&FullSpace, MatchMode::Intersects, visitor)
    }

    /// Number of entries intersecting `query`.
    pub fn count<Q: Query<B> + ?Sized>(&self, query: &Q) -> SpatialResult<u64> {
        let mut counter = CountVisitor::default();
        self.intersects_with(query, &mut counter)?;
        Ok(counter.count)
    }

    /// Identifiers of the entries intersecting `query`, in traversal order.
    pub fn ids<Q: Query<B> + ?Sized>(&self, query: &Q) -> SpatialResult<Vec<EntryId>> {
        let mut ids = IdVisitor::default();
        self.intersects_with(query, &mut ids)?;
        Ok(ids.ids)
    }

    /// Bounding region of all entries, read from the root. `None` when empty.
    pub fn bounds(&self) -> SpatialResult<Option<B>> {
        let mut bounds = BoundsVisitor::default();
        self.visit_all(&mut bounds)?;
        Ok(bounds.bounds)
    }

    pub fn statistics(&self) -> Statistics {
        self.counters.snapshot(
            self.header.entry_count,
            self.header.height,
            self.header.node_count,
        )
    }

    /// Loads a node by identifier.
    pub fn read_node(&self, id: NodeId) -> SpatialResult<Node<B>> {
        self.load(id)
    }

    pub(super) fn load(&self, id: NodeId) -> SpatialResult<Node<B>> {
        Counters::add(&self.counters.reads, 1);
        self.store.load_node(id)
    }

    /// Identifiers of every node, parents before children.
    fn node_ids(&self) -> SpatialResult<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(self.header.node_count as usize);
        let mut stack = vec![self.header.root];
        while let Some(id) = stack.pop() {
            ids.push(id);
            if let Node::Index { children, .. } = self.load(id)? {
                stack.extend(children.iter().map(|c| c.node_id));
            }
        }
        Ok(ids)
    }

    /// Checks the structural invariants of the stored tree.
    ///
    /// Every stored child region must equal the union of the child's contents,
    /// levels must decrease by one towards the leaves, non-root nodes must hold
    /// between `min_entries` and `capacity` children, and the header counts must
    /// match the nodes. Violations are reported as `Corrupted`.
    pub fn validate(&self) -> SpatialResult<()> {
        let root = self.load(self.header.root)?;
        if root.level() + 1 != self.header.height {
            return Err(SpatialError::Corrupted(format!(
                "root level {} does not match height {}",
                root.level(),
                self.header.height
            )));
        }
        if root.is_empty() && !(root.is_leaf() && self.header.entry_count == 0) {
            return Err(SpatialError::Corrupted(
                "empty root in a non-empty tree".into(),
            ));
        }

        let mut entries = 0u64;
        let mut nodes = 0u64;
        self.validate_node(self.header.root, &root, true, &mut entries, &mut nodes)?;
        if entries != self.header.entry_count {
            return Err(SpatialError::Corrupted(format!(
                "header counts {} entries, found {}",
                self.header.entry_count, entries
            )));
        }
        if nodes != self.header.node_count {
            return Err(SpatialError::Corrupted(format!(
                "header counts {} nodes, found {}",
                self.header.node_count, nodes
            )));
        }
        Ok(())
    }

    fn validate_node(
        &self,
        id: NodeId,
        node: &Node<B>,
        is_root: bool,
        entries: &mut u64,
        nodes: &mut u64,
    ) -> SpatialResult<()> {
        *nodes += 1;
        let config = self.config();
        let len = node.len();
        if len > config.capacity || (!is_root && len < config.min_entries()) {
            return Err(SpatialError::Corrupted(format!(
                "node {} holds {} children, allowed {}..={}",
                id,
                len,
                config.min_entries(),
                config.capacity
            )));
        }

        match node {
            Node::Leaf { entries: data } => {
                for entry in data {
                    SpatialError::dimension(self.dimension(), entry.region.dimension())?;
                }
                *entries += data.len() as u64;
            }
            Node::Index { children, level } => {
                for child in children {
                    let child_node = self.load(child.node_id)?;
                    if child_node.level() + 1 != *level {
                        return Err(SpatialError::Corrupted(format!(
                            "node {} at level {} is a child of node {} at level {}",
                            child.node_id,
                            child_node.level(),
                            id,
                            level
                        )));
                    }
                    if require_region(&child_node, child.node_id)? != child.region {
                        return Err(SpatialError::Corrupted(format!(
                            "stored region of node {} is stale",
                            child.node_id
                        )));
                    }
                    self.validate_node(child.node_id, &child_node, false, entries, nodes)?;
                }
            }
        }
        Ok(())
    }

    /// Writes buffered store state to its backing medium.
    pub fn flush(&mut self) -> SpatialResult<()> {
        self.store.flush()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the tree, returning its store.
    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: NodeStore<Region>> RTree<Region, S> {
    /// Visits every entry containing `point`.
    pub fn point_location<V: Visitor<Region>>(&self, point: &[f64], visitor: V) -> SpatialResult<()> {
        SpatialError::dimension(self.dimension(), point.len())?;
        let query = Region::point(point)?;
        self.traverse(&query, MatchMode::Intersects, visitor)
    }

    /// Identifiers of the `k` entries nearest to `query`, ties with the k-th
    /// included, nearest first.
    pub fn nearest(&self, k: usize, query: &Region) -> SpatialResult<Vec<EntryId>> {
        let mut ids = IdVisitor::default();
        self.nearest_neighbors(k, query, &mut ids)?;
        Ok(ids.ids)
    }
}

impl<S: NodeStore<MovingRegion>> RTree<MovingRegion, S> {
    /// Inserts an object occupying `region` at `time` and moving with
    /// `velocity`, valid for the configured horizon.
    pub fn insert_object(
        &mut self,
        id: EntryId,
        region: Region,
        velocity: Vec<f64>,
        time: f64,
    ) -> SpatialResult<()> {
        let moving = MovingRegion::new(region, velocity, time, self.config().horizon)?;
        self.insert(Entry::new(id, moving))
    }
}
