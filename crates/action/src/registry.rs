//! Node Registry (spec §4.3): maps a `NodeTypeId` to its handler.

use crate::error::NodeError;
use crate::node::NodeHandler;
use dashmap::DashMap;
use fleet_core::NodeTypeId;
use std::sync::Arc;

#[derive(Default)]
pub struct NodeRegistry {
    handlers: DashMap<NodeTypeId, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `node_type`, replacing any prior
    /// registration for the same type.
    pub fn register(&self, node_type: NodeTypeId, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: &NodeTypeId) -> Result<Arc<dyn NodeHandler>, NodeError> {
        self.handlers
            .get(node_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| NodeError::UnregisteredType(node_type.clone()))
    }

    pub fn contains(&self, node_type: &NodeTypeId) -> bool {
        self.handlers.contains_key(node_type)
    }

    pub fn unregister(&self, node_type: &NodeTypeId) -> bool {
        self.handlers.remove(node_type).is_some()
    }

    pub fn list_node_types(&self) -> Vec<NodeTypeId> {
        self.handlers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
