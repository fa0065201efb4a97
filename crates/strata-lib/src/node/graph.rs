//! The node arena
//!
//! `NodeGraph` owns every node of every store. Nodes refer to one another
//! only by [`NodeId`], so sharing a frozen subtree between versions, stores
//! and branches is just copying an id.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Node, NodeBody, NodeId};
use crate::error::{Result, StoreError};
use crate::version::StoreId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh id. Ids are never handed out twice.
    pub fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    /// Build a new node with a fresh id; the caller inserts it.
    pub fn new_node(&mut self, body: NodeBody, owner: Option<StoreId>) -> Node {
        let now = Utc::now();
        Node {
            id: self.allocate_id(),
            body,
            owner,
            predecessor: None,
            guid: uuid::Uuid::new_v4().to_string(),
            properties: BTreeMap::new(),
            aspects: Default::default(),
            created: now,
            modified: now,
        }
    }

    /// A copy-on-write copy of `id`: same body and metadata, fresh id,
    /// predecessor pointing back at the original.
    pub fn derive(&mut self, id: NodeId, owner: Option<StoreId>) -> Result<Node> {
        let mut node = self.get(id)?.clone();
        let now = Utc::now();
        node.id = self.allocate_id();
        node.owner = owner;
        node.predecessor = Some(id);
        node.created = now;
        node.modified = now;
        Ok(node)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| StoreError::not_found(format!("node {}", id)))
    }

    /// Mutable access without an ownership check. Callers inside the
    /// mutation engine go through [`NodeGraph::get_owned_mut`] instead.
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("node {}", id)))
    }

    /// Mutable access to a node that must belong to `store`'s head.
    pub fn get_owned_mut(&mut self, id: NodeId, store: StoreId) -> Result<&mut Node> {
        let node = self.get_mut(id)?;
        if node.owner != Some(store) {
            return Err(StoreError::ImmutableVersion(format!(
                "node {} is not part of the head being edited",
                id
            )));
        }
        Ok(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id, node)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
