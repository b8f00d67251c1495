//! Query traversals: range queries, nearest neighbours and self-join.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::ControlFlow;

use super::rtree_impl::RTree;
use crate::errors::{NodeId, SpatialError, SpatialResult};
use crate::geometry::{Bounds, Region};
use crate::node::{Entry, Node};
use crate::query::Query;
use crate::stats::Counters;
use crate::storage::NodeStore;
use crate::visitor::{NodeView, Visitor};

/// Which entries a range traversal reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchMode {
    /// Entries intersecting the query.
    Intersects,
    /// Entries lying inside the query.
    Contains,
}

impl<B: Bounds, S: NodeStore<B>> RTree<B, S> {
    /// Depth-first traversal visiting children in stored order.
    ///
    /// Every node reached is passed to `visit_node`; subtrees whose region does
    /// not intersect the query are skipped.
    pub(crate) fn traverse<Q, V>(&self, query: &Q, mode: MatchMode, mut visitor: V) -> SpatialResult<()>
    where
        Q: Query<B> + ?Sized,
        V: Visitor<B>,
    {
        self.check_query(query)?;
        let mut stack = vec![self.root_id()];
        while let Some(id) = stack.pop() {
            let node = self.load(id)?;
            if visitor.visit_node(&NodeView::new(id, &node)).is_break() {
                return Ok(());
            }
            match &node {
                Node::Leaf { entries } => {
                    for entry in entries {
                        let hit = match mode {
                            MatchMode::Intersects => query.intersects(&entry.region),
                            MatchMode::Contains => query.contains(&entry.region),
                        };
                        if !hit {
                            continue;
                        }
                        Counters::add(&self.counters.query_results, 1);
                        if visitor.visit_data(entry).is_break() {
                            return Ok(());
                        }
                    }
                }
                Node::Index { children, .. } => {
                    // reversed so the first child is popped first
                    for child in children.iter().rev() {
                        if query.intersects(&child.region) {
                            stack.push(child.node_id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_query<Q: Query<B> + ?Sized>(&self, query: &Q) -> SpatialResult<()> {
        match query.dimension() {
            Some(dimension) => SpatialError::dimension(self.dimension(), dimension),
            None => Ok(()),
        }
    }

    /// Reports every unordered pair of distinct entries intersecting each other
    /// and the query as a two-element batch.
    pub fn self_join<Q, V>(&self, query: &Q, mut visitor: V) -> SpatialResult<()>
    where
        Q: Query<B> + ?Sized,
        V: Visitor<B>,
    {
        self.check_query(query)?;
        let root = self.load(self.root_id())?;
        self.join_nodes(query, &root, &root, true, &mut visitor)?;
        Ok(())
    }

    fn join_nodes<Q, V>(
        &self,
        query: &Q,
        a: &Node<B>,
        b: &Node<B>,
        same: bool,
        visitor: &mut V,
    ) -> SpatialResult<ControlFlow<()>>
    where
        Q: Query<B> + ?Sized,
        V: Visitor<B>,
    {
        match (a, b) {
            (Node::Leaf { entries: left }, Node::Leaf { entries: right }) => {
                for (i, x) in left.iter().enumerate() {
                    if !query.intersects(&x.region) {
                        continue;
                    }
                    let start = if same { i + 1 } else { 0 };
                    for y in right.iter().skip(start) {
                        if !query.intersects(&y.region) || !x.region.intersects(&y.region)? {
                            continue;
                        }
                        Counters::add(&self.counters.query_results, 2);
                        if visitor.visit_data_batch(&[x, y]).is_break() {
                            return Ok(ControlFlow::Break(()));
                        }
                    }
                }
            }
            (Node::Index { children: left, .. }, Node::Index { children: right, .. }) => {
                for (i, x) in left.iter().enumerate() {
                    if !query.intersects(&x.region) {
                        continue;
                    }
                    let start = if same { i } else { 0 };
                    for (j, y) in right.iter().enumerate().skip(start) {
                        if !query.intersects(&y.region) || !x.region.intersects(&y.region)? {
                            continue;
                        }
                        let first = self.load(x.node_id)?;
                        let flow = if same && i == j {
                            self.join_nodes(query, &first, &first, true, visitor)?
                        } else {
                            let second = self.load(y.node_id)?;
                            self.join_nodes(query, &first, &second, false, visitor)?
                        };
                        if flow.is_break() {
                            return Ok(flow);
                        }
                    }
                }
            }
            _ => {
                return Err(SpatialError::Corrupted(
                    "self-join reached nodes on different levels".into(),
                ))
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Candidate of the nearest-neighbour search, ordered by distance.
enum Candidate<B> {
    Node(NodeId),
    Data(Entry<B>),
}

struct Queued<B> {
    distance: f64,
    sequence: u64,
    candidate: Candidate<B>,
}

impl<B> PartialEq for Queued<B> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<B> Eq for Queued<B> {}

impl<B> PartialOrd for Queued<B> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<B> Ord for Queued<B> {
    // reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<S: NodeStore<Region>> RTree<Region, S> {
    /// Best-first k-nearest-neighbour search by minimum distance to `query`.
    ///
    /// Entries are visited in ascending distance; entries tied with the k-th
    /// distance are visited too, so more than `k` entries may be reported.
    pub fn nearest_neighbors<V: Visitor<Region>>(
        &self,
        k: usize,
        query: &Region,
        mut visitor: V,
    ) -> SpatialResult<()> {
        SpatialError::dimension(self.dimension(), query.dimension())?;
        if k == 0 {
            return Ok(());
        }

        let mut heap = BinaryHeap::new();
        let mut sequence = 0u64;
        heap.push(Queued {
            distance: 0.0,
            sequence,
            candidate: Candidate::Node(self.root_id()),
        });

        let mut reported = 0usize;
        let mut last_distance = 0.0;
        while let Some(Queued {
            distance,
            candidate,
            ..
        }) = heap.pop()
        {
            if reported >= k && distance > last_distance {
                break;
            }
            match candidate {
                Candidate::Data(entry) => {
                    Counters::add(&self.counters.query_results, 1);
                    reported += 1;
                    last_distance = distance;
                    if visitor.visit_data(&entry).is_break() {
                        return Ok(());
                    }
                }
                Candidate::Node(id) => {
                    let node = self.load(id)?;
                    if visitor.visit_node(&NodeView::new(id, &node)).is_break() {
                        return Ok(());
                    }
                    match node {
                        Node::Leaf { entries } => {
                            for entry in entries {
                                sequence += 1;
                                heap.push(Queued {
                                    distance: query.min_distance_unchecked(&entry.region),
                                    sequence,
                                    candidate: Candidate::Data(entry),
                                });
                            }
                        }
                        Node::Index { children, .. } => {
                            for child in children {
                                sequence += 1;
                                heap.push(Queued {
                                    distance: query.min_distance_unchecked(&child.region),
                                    sequence,
                                    candidate: Candidate::Node(child.node_id),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
