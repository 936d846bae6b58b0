//! DAG validation for a [`WorkflowDefinition`] (spec §3 invariants):
//! unique node ids, edges referencing real nodes, no self-loops, at least
//! one entry node, and the whole graph must be acyclic.

use crate::error::WorkflowError;
use crate::model::WorkflowDefinition;
use fleet_core::NodeId;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Validate `workflow` and return its nodes in topological order.
///
/// # Errors
/// See [`WorkflowError::DuplicateNodeId`], [`WorkflowError::UnknownNodeReference`],
/// [`WorkflowError::SelfLoop`], [`WorkflowError::NoEntryNode`], [`WorkflowError::CycleDetected`].
pub fn validate(workflow: &WorkflowDefinition) -> Result<Vec<NodeId>, WorkflowError> {
    let mut index_of: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(workflow.nodes.len());
    let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());

    for node in &workflow.nodes {
        if index_of.contains_key(&node.id) {
            return Err(WorkflowError::DuplicateNodeId(node.id.clone()));
        }
        let idx = graph.add_node(node.id.clone());
        index_of.insert(&node.id, idx);
    }

    for edge in &workflow.edges {
        if edge.source == edge.target {
            return Err(WorkflowError::SelfLoop(edge.id.clone()));
        }
        let source_idx = *index_of.get(&edge.source).ok_or_else(|| WorkflowError::UnknownNodeReference {
            edge: edge.id.clone(),
            node: edge.source.clone(),
            side: "source",
        })?;
        let target_idx = *index_of.get(&edge.target).ok_or_else(|| WorkflowError::UnknownNodeReference {
            edge: edge.id.clone(),
            node: edge.target.clone(),
            side: "target",
        })?;
        graph.add_edge(source_idx, target_idx, ());
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(_) => return Err(WorkflowError::CycleDetected),
    };

    // Any non-empty acyclic graph has at least one zero-in-degree node by
    // construction, so this can only trip on a non-empty graph that
    // `toposort` somehow accepted without one — kept as the spec's named
    // invariant rather than inlined into the cycle check.
    if !workflow.nodes.is_empty() && entry_nodes(&graph).next().is_none() {
        return Err(WorkflowError::NoEntryNode);
    }

    Ok(order.into_iter().map(|idx| graph[idx].clone()).collect())
}

/// Node ids with zero incoming edges — the scheduler's entry set (spec
/// §4.6 "Entry").
pub fn entry_node_ids(workflow: &WorkflowDefinition) -> Vec<NodeId> {
    let targets: std::collections::HashSet<&NodeId> = workflow.edges.iter().map(|e| &e.target).collect();
    workflow
        .nodes
        .iter()
        .filter(|n| !targets.contains(&n.id))
        .map(|n| n.id.clone())
        .collect()
}

fn entry_nodes(graph: &DiGraph<NodeId, ()>) -> impl Iterator<Item = NodeIndex> + '_ {
    use petgraph::Direction;
    graph
        .node_indices()
        .filter(move |&idx| graph.neighbors_directed(idx, Direction::Incoming).next().is_none())
}
