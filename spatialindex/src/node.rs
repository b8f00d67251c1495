//! Tree vertices and the entries they hold.

use serde::{Deserialize, Serialize};

use crate::errors::{EntryId, NodeId, SpatialError, SpatialResult};
use crate::geometry::Bounds;

// ============================================================================
// Entries
// ============================================================================

/// A data entry: caller-assigned identifier, bounding region and optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<B> {
    pub id: EntryId,
    pub region: B,
    pub payload: Vec<u8>,
}

impl<B> Entry<B> {
    pub fn new(id: EntryId, region: B) -> Self {
        Self {
            id,
            region,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(id: EntryId, region: B, payload: Vec<u8>) -> Self {
        Self {
            id,
            region,
            payload,
        }
    }
}

/// A child reference in an index node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef<B> {
    pub region: B,
    pub node_id: NodeId,
}

// ============================================================================
// Node
// ============================================================================

/// Node types in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node<B> {
    /// Leaf node containing data entries
    Leaf { entries: Vec<Entry<B>> },
    /// Index node referencing children by identifier
    Index {
        children: Vec<ChildRef<B>>,
        level: u32, // Height from leaf level (leaves are 0)
    },
}

/// Either kind of node child, used where entries and child references are
/// handled uniformly (splitting, reinsertion, bulk packing).
#[derive(Debug, Clone)]
pub(crate) enum Item<B> {
    Data(Entry<B>),
    Child(ChildRef<B>),
}

impl<B> Item<B> {
    pub(crate) fn region(&self) -> &B {
        match self {
            Item::Data(entry) => &entry.region,
            Item::Child(child) => &child.region,
        }
    }
}

impl<B: Bounds> Node<B> {
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            entries: Vec::new(),
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Index { level, .. } => *level,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Index { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Region of the child at `index`.
    pub fn region_at(&self, index: usize) -> &B {
        match self {
            Node::Leaf { entries } => &entries[index].region,
            Node::Index { children, .. } => &children[index].region,
        }
    }

    /// Get the region enclosing all children, `None` for an empty node
    pub fn compute_region(&self) -> SpatialResult<Option<B>> {
        let mut acc: Option<B> = None;
        for i in 0..self.len() {
            let region = self.region_at(i);
            acc = Some(match acc {
                None => region.clone(),
                Some(current) => current.union(region)?,
            });
        }
        Ok(acc)
    }

    pub(crate) fn from_items(level: u32, items: Vec<Item<B>>) -> SpatialResult<Self> {
        let mut node = if level == 0 {
            Node::Leaf {
                entries: Vec::with_capacity(items.len()),
            }
        } else {
            Node::Index {
                children: Vec::with_capacity(items.len()),
                level,
            }
        };
        for item in items {
            node.push(item)?;
        }
        Ok(node)
    }

    pub(crate) fn into_items(self) -> Vec<Item<B>> {
        match self {
            Node::Leaf { entries } => entries.into_iter().map(Item::Data).collect(),
            Node::Index { children, .. } => children.into_iter().map(Item::Child).collect(),
        }
    }

    pub(crate) fn push(&mut self, item: Item<B>) -> SpatialResult<()> {
        match (self, item) {
            (Node::Leaf { entries }, Item::Data(entry)) => entries.push(entry),
            (Node::Index { children, .. }, Item::Child(child)) => children.push(child),
            (node, _) => {
                return Err(SpatialError::InvalidOperation(format!(
                    "item kind does not match node at level {}",
                    node.level()
                )))
            }
        }
        Ok(())
    }

    pub(crate) fn remove_item(&mut self, index: usize) -> Item<B> {
        match self {
            Node::Leaf { entries } => Item::Data(entries.remove(index)),
            Node::Index { children, .. } => Item::Child(children.remove(index)),
        }
    }

    pub(crate) fn set_child_region(&mut self, index: usize, region: B) {
        if let Node::Index { children, .. } = self {
            children[index].region = region;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::new(vec![x0, y0], vec![x1, y1]).unwrap()
    }

    #[test]
    fn test_empty_leaf() {
        let node: Node<Region> = Node::empty_leaf();
        assert!(node.is_leaf());
        assert!(node.is_empty());
        assert_eq!(node.level(), 0);
        assert_eq!(node.compute_region().unwrap(), None);
    }

    #[test]
    fn test_compute_region_is_union_of_children() {
        let node = Node::Leaf {
            entries: vec![
                Entry::new(1, rect(0.0, 0.0, 1.0, 1.0)),
                Entry::new(2, rect(3.0, -1.0, 4.0, 0.5)),
            ],
        };
        assert_eq!(
            node.compute_region().unwrap(),
            Some(rect(0.0, -1.0, 4.0, 1.0))
        );
    }

    #[test]
    fn test_push_rejects_mismatched_item() {
        let mut leaf: Node<Region> = Node::empty_leaf();
        let child = Item::Child(ChildRef {
            region: rect(0.0, 0.0, 1.0, 1.0),
            node_id: 9,
        });
        assert!(matches!(
            leaf.push(child),
            Err(SpatialError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_items_roundtrip_preserves_order() {
        let items = vec![
            Item::Child(ChildRef {
                region: rect(0.0, 0.0, 1.0, 1.0),
                node_id: 4,
            }),
            Item::Child(ChildRef {
                region: rect(1.0, 1.0, 2.0, 2.0),
                node_id: 7,
            }),
        ];
        let mut node = Node::from_items(2, items).unwrap();
        assert_eq!(node.level(), 2);

        node.set_child_region(1, rect(1.0, 1.0, 5.0, 5.0));
        assert_eq!(node.region_at(1), &rect(1.0, 1.0, 5.0, 5.0));

        let removed = node.remove_item(0);
        assert_eq!(removed.region(), &rect(0.0, 0.0, 1.0, 1.0));
        let ids: Vec<NodeId> = node
            .into_items()
            .into_iter()
            .filter_map(|item| match item {
                Item::Child(c) => Some(c.node_id),
                Item::Data(_) => None,
            })
            .collect();
        assert_eq!(ids, vec![7]);
    }
}
