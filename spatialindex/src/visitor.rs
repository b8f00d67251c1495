//! Visitors receive the nodes and entries reached by a traversal.
//!
//! A traversal calls [`Visitor::visit_node`] for every node it enters and
//! [`Visitor::visit_data`] for every qualifying entry. Returning
//! [`ControlFlow::Break`] from any method ends the traversal early.

use std::ops::ControlFlow;

use crate::errors::{EntryId, NodeId, SpatialResult};
use crate::geometry::Bounds;
use crate::node::{Entry, Node};

/// Read-only view of a node handed to [`Visitor::visit_node`].
#[derive(Debug)]
pub struct NodeView<'a, B> {
    id: NodeId,
    node: &'a Node<B>,
}

impl<'a, B: Bounds> NodeView<'a, B> {
    pub(crate) fn new(id: NodeId, node: &'a Node<B>) -> Self {
        Self { id, node }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn level(&self) -> u32 {
        self.node.level()
    }

    pub fn is_leaf(&self) -> bool {
        self.node.is_leaf()
    }

    pub fn len(&self) -> usize {
        self.node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_empty()
    }

    pub fn node(&self) -> &'a Node<B> {
        self.node
    }

    /// Bounding region of the node, computed on demand. `None` for an empty root.
    pub fn region(&self) -> SpatialResult<Option<B>> {
        self.node.compute_region()
    }
}

/// Query sink invoked by tree traversals.
pub trait Visitor<B> {
    fn visit_node(&mut self, _node: &NodeView<'_, B>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn visit_data(&mut self, entry: &Entry<B>) -> ControlFlow<()>;

    /// Receives entries reported together, such as the pairs of a self-join.
    fn visit_data_batch(&mut self, entries: &[&Entry<B>]) -> ControlFlow<()> {
        for entry in entries {
            if self.visit_data(entry).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl<B, V: Visitor<B> + ?Sized> Visitor<B> for &mut V {
    fn visit_node(&mut self, node: &NodeView<'_, B>) -> ControlFlow<()> {
        (**self).visit_node(node)
    }

    fn visit_data(&mut self, entry: &Entry<B>) -> ControlFlow<()> {
        (**self).visit_data(entry)
    }

    fn visit_data_batch(&mut self, entries: &[&Entry<B>]) -> ControlFlow<()> {
        (**self).visit_data_batch(entries)
    }
}

/// Counts matching entries.
#[derive(Debug, Default, Clone)]
pub struct CountVisitor {
    pub count: u64,
}

impl<B> Visitor<B> for CountVisitor {
    fn visit_data(&mut self, _entry: &Entry<B>) -> ControlFlow<()> {
        self.count += 1;
        ControlFlow::Continue(())
    }
}

/// Collects the identifiers of matching entries in visit order.
#[derive(Debug, Default, Clone)]
pub struct IdVisitor {
    pub ids: Vec<EntryId>,
}

impl<B> Visitor<B> for IdVisitor {
    fn visit_data(&mut self, entry: &Entry<B>) -> ControlFlow<()> {
        self.ids.push(entry.id);
        ControlFlow::Continue(())
    }
}

/// Records the region of the first node or entry visited, then stops.
///
/// Run from the root this yields the bounds of the whole dataset without
/// scanning it.
#[derive(Debug, Clone)]
pub struct BoundsVisitor<B> {
    pub bounds: Option<B>,
}

impl<B> Default for BoundsVisitor<B> {
    fn default() -> Self {
        Self { bounds: None }
    }
}

impl<B: Bounds> Visitor<B> for BoundsVisitor<B> {
    fn visit_node(&mut self, node: &NodeView<'_, B>) -> ControlFlow<()> {
        match node.region() {
            Ok(Some(region)) => {
                self.bounds = Some(region);
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    }

    fn visit_data(&mut self, entry: &Entry<B>) -> ControlFlow<()> {
        self.bounds = Some(entry.region.clone());
        ControlFlow::Break(())
    }
}

/// Adapts a closure over entries into a visitor.
pub struct FnVisitor<F> {
    f: F,
}

/// Creates a visitor calling `f` for every matching entry.
///
/// ```rust
/// use std::ops::ControlFlow;
/// use spatialindex::{visitor, Entry, IndexConfig, MemoryStore, RTree, Region};
///
/// let mut tree = RTree::create(MemoryStore::new(), IndexConfig::new(2)).unwrap();
/// for i in 0..5 {
///     let x = i as f64;
///     tree.insert(Entry::new(i, Region::new(vec![x, x], vec![x + 0.5, x + 0.5]).unwrap()))
///         .unwrap();
/// }
///
/// let mut seen = Vec::new();
/// let window = Region::new(vec![1.0, 1.0], vec![3.0, 3.0]).unwrap();
/// tree.intersects_with(
///     &window,
///     visitor::from_fn(|entry: &Entry<Region>| {
///         seen.push(entry.id);
///         ControlFlow::Continue(())
///     }),
/// )
/// .unwrap();
/// seen.sort();
/// assert_eq!(seen, vec![1, 2, 3]);
/// ```
pub fn from_fn<F>(f: F) -> FnVisitor<F> {
    FnVisitor { f }
}

impl<B, F> Visitor<B> for FnVisitor<F>
where
    F: FnMut(&Entry<B>) -> ControlFlow<()>,
{
    fn visit_data(&mut self, entry: &Entry<B>) -> ControlFlow<()> {
        (self.f)(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn entry(id: EntryId, x: f64) -> Entry<Region> {
        Entry::new(id, Region::new(vec![x, x], vec![x + 1.0, x + 1.0]).unwrap())
    }

    #[test]
    fn test_count_and_id_visitors() {
        let mut count = CountVisitor::default();
        let mut ids = IdVisitor::default();
        for e in [entry(3, 0.0), entry(1, 1.0)] {
            assert!(count.visit_data(&e).is_continue());
            assert!(ids.visit_data(&e).is_continue());
        }
        assert_eq!(count.count, 2);
        assert_eq!(ids.ids, vec![3, 1]);
    }

    #[test]
    fn test_bounds_visitor_takes_first_node_region() {
        let leaf = Node::Leaf {
            entries: vec![entry(1, 0.0), entry(2, 5.0)],
        };
        let mut bounds = BoundsVisitor::default();
        assert!(bounds.visit_node(&NodeView::new(1, &leaf)).is_break());
        assert_eq!(
            bounds.bounds,
            Some(Region::new(vec![0.0, 0.0], vec![6.0, 6.0]).unwrap())
        );
    }

    #[test]
    fn test_bounds_visitor_skips_empty_node() {
        let empty: Node<Region> = Node::empty_leaf();
        let mut bounds = BoundsVisitor::default();
        assert!(bounds.visit_node(&NodeView::new(1, &empty)).is_continue());
        assert!(bounds.bounds.is_none());
    }

    #[test]
    fn test_batch_defaults_to_visit_data_and_stops_on_break() {
        let mut seen = Vec::new();
        let mut v = from_fn(|e: &Entry<Region>| {
            seen.push(e.id);
            if e.id == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let (a, b, c) = (entry(1, 0.0), entry(2, 0.0), entry(3, 0.0));
        assert!(v.visit_data_batch(&[&a, &b, &c]).is_break());
        drop(v);
        assert_eq!(seen, vec![1, 2]);
    }
}
