//! Deletion with tree condensation.

use std::cmp::Reverse;

use log::{debug, trace};

use super::insert::{require_region, OverflowState};
use super::pending::{Mutation, PathStep};
use crate::errors::{EntryId, NodeId, SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::node::{Entry, Item, Node};
use crate::stats::Counters;
use crate::storage::NodeStore;

/// Leaf holding the delete target, with the position of the entry in it.
struct Found<B> {
    path: Vec<PathStep<B>>,
    id: NodeId,
    leaf: Node<B>,
    index: usize,
}

impl<'a, B: Bounds, S: NodeStore<B>> Mutation<'a, B, S> {
    /// Removes the entry matching `(id, region)` exactly.
    pub(crate) fn delete_entry(&mut self, id: EntryId, region: &B) -> SpatialResult<Entry<B>> {
        let root_id = self.header.root;
        let root = self.load(root_id)?;
        let mut path = Vec::new();
        let Some(found) = self.find_leaf(root_id, root, id, region, &mut path)? else {
            return Err(SpatialError::EntryNotFound(id));
        };

        let Found {
            path,
            id: leaf_id,
            mut leaf,
            index,
        } = found;
        let entry = match leaf.remove_item(index) {
            Item::Data(entry) => entry,
            Item::Child(_) => {
                return Err(SpatialError::Corrupted(format!(
                    "node {} holds child references at level 0",
                    leaf_id
                )))
            }
        };
        self.header.entry_count = self.header.entry_count.saturating_sub(1);
        self.condense(path, leaf_id, leaf)?;
        Ok(entry)
    }

    /// Depth-first search descending only into children containing `region`.
    fn find_leaf(
        &self,
        node_id: NodeId,
        node: Node<B>,
        id: EntryId,
        region: &B,
        path: &mut Vec<PathStep<B>>,
    ) -> SpatialResult<Option<Found<B>>> {
        let leaf_match = match &node {
            Node::Leaf { entries } => Some(
                entries
                    .iter()
                    .position(|e| e.id == id && &e.region == region),
            ),
            Node::Index { .. } => None,
        };
        if let Some(index) = leaf_match {
            return Ok(index.map(|index| Found {
                path: std::mem::take(path),
                id: node_id,
                leaf: node,
                index,
            }));
        }

        for child in 0..node.len() {
            if !node.region_at(child).contains(region)? {
                continue;
            }
            let child_id = match &node {
                Node::Index { children, .. } => children[child].node_id,
                Node::Leaf { .. } => break,
            };
            let child_node = self.load(child_id)?;
            path.push(PathStep {
                id: node_id,
                node: node.clone(),
                child,
            });
            if let Some(found) = self.find_leaf(child_id, child_node, id, region, path)? {
                return Ok(Some(found));
            }
            path.pop();
        }
        Ok(None)
    }

    /// Dissolves underfull non-root nodes along `path`, reinserts their
    /// children at their original level and shrinks the root.
    fn condense(
        &mut self,
        mut path: Vec<PathStep<B>>,
        node_id: NodeId,
        node: Node<B>,
    ) -> SpatialResult<()> {
        let min = self.config().min_entries();
        let mut orphans: Vec<(u32, Item<B>)> = Vec::new();
        let mut current_id = node_id;
        let mut current = node;

        while let Some(PathStep {
            id: parent_id,
            node: mut parent,
            child,
        }) = path.pop()
        {
            if current.len() < min {
                let level = current.level();
                trace!(
                    "Condensing node {} at level {} ({} children)",
                    current_id,
                    level,
                    current.len()
                );
                orphans.extend(current.into_items().into_iter().map(|item| (level, item)));
                self.remove(current_id);
                parent.remove_item(child);
                Counters::add(&self.counters.condensed_nodes, 1);
            } else {
                let region = require_region(&current, current_id)?;
                self.write(current_id, current);
                parent.set_child_region(child, region);
            }
            current_id = parent_id;
            current = parent;
        }
        self.write(current_id, current);

        // highest level first so subtrees land above their level-0 entries
        orphans.sort_by_key(|(level, _)| Reverse(*level));
        for (level, item) in orphans {
            let mut state = OverflowState::default();
            self.insert_item(item, level, &mut state)?;
        }
        self.shrink_root()
    }

    /// Promotes the only child of an index root until the root is a leaf or
    /// has several children.
    pub(crate) fn shrink_root(&mut self) -> SpatialResult<()> {
        loop {
            let root_id = self.header.root;
            match self.load(root_id)? {
                Node::Index { children, .. } if children.len() == 1 => {
                    self.remove(root_id);
                    self.header.root = children[0].node_id;
                    self.header.height = self.header.height.saturating_sub(1).max(1);
                    debug!("Root shrunk, tree height is now {}", self.header.height);
                }
                Node::Index { children, .. } if children.is_empty() => {
                    self.write(root_id, Node::empty_leaf());
                    self.header.height = 1;
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }
}
