use std::collections::HashMap;

use super::{NodeStore, TreeHeader};
use crate::errors::{NodeId, SpatialError, SpatialResult};
use crate::geometry::Bounds;
use crate::node::Node;

/// In-memory node store. Identifiers start at 1 and freed ones are reused.
#[derive(Debug, Clone)]
pub struct MemoryStore<B> {
    nodes: HashMap<NodeId, Node<B>>,
    next_id: NodeId,
    free: Vec<NodeId>,
    header: Option<TreeHeader>,
}

impl<B> Default for MemoryStore<B> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            free: Vec::new(),
            header: None,
        }
    }
}

impl<B> MemoryStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }
}

impl<B: Bounds> NodeStore<B> for MemoryStore<B> {
    fn load_node(&self, id: NodeId) -> SpatialResult<Node<B>> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(SpatialError::NodeNotFound(id))
    }

    fn store_node(&mut self, id: Option<NodeId>, node: &Node<B>) -> SpatialResult<NodeId> {
        let id = match id {
            Some(id) => id,
            None => self.new_identifier()?,
        };
        self.nodes.insert(id, node.clone());
        Ok(id)
    }

    fn delete_node(&mut self, id: NodeId) -> SpatialResult<()> {
        self.nodes
            .remove(&id)
            .ok_or(SpatialError::NodeNotFound(id))?;
        self.free.push(id);
        Ok(())
    }

    fn new_identifier(&mut self) -> SpatialResult<NodeId> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    fn release_identifier(&mut self, id: NodeId) -> SpatialResult<()> {
        self.nodes.remove(&id);
        self.free.push(id);
        Ok(())
    }

    fn load_header(&self) -> SpatialResult<Option<TreeHeader>> {
        Ok(self.header.clone())
    }

    fn store_header(&mut self, header: &TreeHeader) -> SpatialResult<()> {
        self.header = Some(header.clone());
        Ok(())
    }
}
