//! Insertion with subtree choice, forced reinsertion and split propagation.

use std::collections::HashSet;

use log::{debug, trace};

use super::pending::{Mutation, PathStep};
use super::split::split;
use crate::errors::{NodeId, SpatialError, SpatialResult};
use crate::geometry::{center_distance_sq, Bounds};
use crate::node::{ChildRef, Entry, Item, Node};
use crate::stats::Counters;
use crate::storage::NodeStore;

/// Overflow bookkeeping for one top-level insertion.
#[derive(Debug, Default)]
pub(crate) struct OverflowState {
    /// Levels already treated by forced reinsertion.
    levels: HashSet<u32>,
    /// Set while reinserted children are being placed.
    reinserting: bool,
}

impl<'a, B: Bounds, S: NodeStore<B>> Mutation<'a, B, S> {
    pub(crate) fn insert_entry(&mut self, entry: Entry<B>) -> SpatialResult<()> {
        let mut state = OverflowState::default();
        self.insert_item(Item::Data(entry), 0, &mut state)?;
        self.header.entry_count += 1;
        Ok(())
    }

    /// Places `item` in a node at `level` (0 for data entries).
    pub(crate) fn insert_item(
        &mut self,
        item: Item<B>,
        level: u32,
        state: &mut OverflowState,
    ) -> SpatialResult<()> {
        let (path, id, mut node) = self.choose_path(item.region(), level)?;
        node.push(item)?;
        self.settle(path, id, node, state)
    }

    /// Descends from the root to the node at `level` best suited for `region`.
    fn choose_path(
        &self,
        region: &B,
        level: u32,
    ) -> SpatialResult<(Vec<PathStep<B>>, NodeId, Node<B>)> {
        let mut path = Vec::new();
        let mut id = self.header.root;
        let mut node = self.load(id)?;
        if node.level() < level {
            return Err(SpatialError::Corrupted(format!(
                "cannot insert at level {} into a tree of height {}",
                level,
                node.level() + 1
            )));
        }

        while node.level() > level {
            let child = choose_subtree(&node, region)?;
            let next = match &node {
                Node::Index { children, .. } => children[child].node_id,
                Node::Leaf { .. } => {
                    return Err(SpatialError::Corrupted(format!("leaf {} above level 0", id)))
                }
            };
            path.push(PathStep { id, node, child });
            id = next;
            node = self.load(id)?;
        }
        Ok((path, id, node))
    }

    /// Writes a modified node, treating overflow first.
    fn settle(
        &mut self,
        path: Vec<PathStep<B>>,
        id: NodeId,
        node: Node<B>,
        state: &mut OverflowState,
    ) -> SpatialResult<()> {
        if node.len() > self.config().capacity {
            return self.overflow(path, id, node, state);
        }
        let region = require_region(&node, id)?;
        self.write(id, node);
        self.adjust_path(path, region)
    }

    /// Updates the child regions along `path` bottom-up, stopping at the first
    /// ancestor whose stored region is already correct.
    pub(crate) fn adjust_path(&mut self, mut path: Vec<PathStep<B>>, region: B) -> SpatialResult<()> {
        let mut region = region;
        while let Some(PathStep {
            id,
            mut node,
            child,
        }) = path.pop()
        {
            if node.region_at(child) == &region {
                return Ok(());
            }
            node.set_child_region(child, region);
            region = require_region(&node, id)?;
            self.write(id, node);
        }
        Ok(())
    }

    fn overflow(
        &mut self,
        path: Vec<PathStep<B>>,
        id: NodeId,
        node: Node<B>,
        state: &mut OverflowState,
    ) -> SpatialResult<()> {
        let level = node.level();
        let is_root = path.is_empty();
        if self.config().uses_reinsertion()
            && !is_root
            && !state.reinserting
            && state.levels.insert(level)
        {
            self.reinsert(path, id, node, state)
        } else {
            self.split_and_propagate(path, id, node, state)
        }
    }

    /// Removes the children farthest from the node's center and inserts them
    /// again from the top, closest first.
    fn reinsert(
        &mut self,
        path: Vec<PathStep<B>>,
        id: NodeId,
        node: Node<B>,
        state: &mut OverflowState,
    ) -> SpatialResult<()> {
        let level = node.level();
        let center = require_region(&node, id)?.center();
        let count = self.config().reinsert_count();

        let items = node.into_items();
        let mut by_distance: Vec<(f64, usize)> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (center_distance_sq(&item.region().center(), &center), i))
            .collect();
        // farthest first; the stable sort keeps stored order among equals
        by_distance.sort_by(|a, b| b.0.total_cmp(&a.0));
        let evicted: HashSet<usize> = by_distance.iter().take(count).map(|(_, i)| *i).collect();

        let mut kept = Vec::with_capacity(items.len() - count);
        let mut removed: Vec<Option<Item<B>>> = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if evicted.contains(&i) {
                removed.push(Some(item));
            } else {
                kept.push(item);
                removed.push(None);
            }
        }

        let node = Node::from_items(level, kept)?;
        let region = require_region(&node, id)?;
        self.write(id, node);
        self.adjust_path(path, region)?;

        trace!("Forced reinsertion of {} children at level {}", count, level);
        Counters::add(&self.counters.forced_reinsertions, 1);

        let previous = state.reinserting;
        state.reinserting = true;
        for (_, i) in by_distance.iter().take(count).rev() {
            if let Some(item) = removed[*i].take() {
                self.insert_item(item, level, state)?;
            }
        }
        state.reinserting = previous;
        Ok(())
    }

    fn split_and_propagate(
        &mut self,
        mut path: Vec<PathStep<B>>,
        id: NodeId,
        node: Node<B>,
        state: &mut OverflowState,
    ) -> SpatialResult<()> {
        let level = node.level();
        let policy = self.config().split_policy;
        let min = self.config().min_entries();
        let (first, second) = split(policy, node.into_items(), min)?;
        let first = Node::from_items(level, first)?;
        let second = Node::from_items(level, second)?;
        let first_region = require_region(&first, id)?;
        let second_region = require_region(&second, id)?;

        self.write(id, first);
        let second_id = self.create(second)?;
        Counters::add(&self.counters.splits, 1);
        trace!("Split node {} at level {} (new sibling {})", id, level, second_id);

        match path.pop() {
            None => {
                let root = Node::Index {
                    children: vec![
                        ChildRef {
                            region: first_region,
                            node_id: id,
                        },
                        ChildRef {
                            region: second_region,
                            node_id: second_id,
                        },
                    ],
                    level: level + 1,
                };
                let root_id = self.create(root)?;
                self.header.root = root_id;
                self.header.height = level + 2;
                debug!("Root split, tree height is now {}", self.header.height);
                Ok(())
            }
            Some(PathStep {
                id: parent_id,
                node: mut parent,
                child,
            }) => {
                parent.set_child_region(child, first_region);
                parent.push(Item::Child(ChildRef {
                    region: second_region,
                    node_id: second_id,
                }))?;
                self.settle(path, parent_id, parent, state)
            }
        }
    }
}

/// Index of the child needing the least enlargement to include `region`; ties
/// go to the smallest resulting area, then to the first child.
pub(crate) fn choose_subtree<B: Bounds>(node: &Node<B>, region: &B) -> SpatialResult<usize> {
    let Node::Index { children, .. } = node else {
        return Err(SpatialError::InvalidOperation(
            "choose_subtree on a leaf".into(),
        ));
    };
    let mut best: Option<(f64, f64, usize)> = None;
    for (i, child) in children.iter().enumerate() {
        let union_area = child.region.union(region)?.area();
        let enlargement = union_area - child.region.area();
        let better = match best {
            None => true,
            Some((best_enlargement, best_area, _)) => {
                enlargement < best_enlargement
                    || (enlargement == best_enlargement && union_area < best_area)
            }
        };
        if better {
            best = Some((enlargement, union_area, i));
        }
    }
    best.map(|(_, _, i)| i).ok_or_else(|| {
        SpatialError::Corrupted("index node without children".into())
    })
}

pub(crate) fn require_region<B: Bounds>(node: &Node<B>, id: NodeId) -> SpatialResult<B> {
    node.compute_region()?
        .ok_or_else(|| SpatialError::Corrupted(format!("node {} is unexpectedly empty", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::new(vec![x0, y0], vec![x1, y1]).unwrap()
    }

    fn index(regions: Vec<Region>) -> Node<Region> {
        Node::Index {
            children: regions
                .into_iter()
                .enumerate()
                .map(|(i, region)| ChildRef {
                    region,
                    node_id: i as NodeId + 1,
                })
                .collect(),
            level: 1,
        }
    }

    #[test]
    fn test_choose_subtree_minimizes_enlargement() {
        let node = index(vec![rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 6.0, 6.0)]);
        assert_eq!(choose_subtree(&node, &rect(5.5, 5.5, 6.5, 6.5)).unwrap(), 1);
        assert_eq!(choose_subtree(&node, &rect(0.2, 0.2, 0.3, 0.3)).unwrap(), 0);
    }

    #[test]
    fn test_choose_subtree_ties_by_area_then_index() {
        // both contain the point: no enlargement, the smaller one wins
        let node = index(vec![rect(0.0, 0.0, 4.0, 4.0), rect(0.0, 0.0, 2.0, 2.0)]);
        assert_eq!(choose_subtree(&node, &rect(1.0, 1.0, 1.0, 1.0)).unwrap(), 1);

        // identical children: the first wins
        let node = index(vec![rect(0.0, 0.0, 2.0, 2.0), rect(0.0, 0.0, 2.0, 2.0)]);
        assert_eq!(choose_subtree(&node, &rect(1.0, 1.0, 1.0, 1.0)).unwrap(), 0);
    }

    #[test]
    fn test_choose_subtree_on_empty_index_fails() {
        let node: Node<Region> = index(vec![]);
        assert!(choose_subtree(&node, &rect(0.0, 0.0, 1.0, 1.0)).is_err());
    }
}
