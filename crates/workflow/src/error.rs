use fleet_core::{EdgeId, NodeId, WorkflowId};
use fleet_error::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("duplicate node id `{0}`")]
    DuplicateNodeId(NodeId),

    #[error("edge `{edge}` references unknown node `{node}` ({side})")]
    UnknownNodeReference {
        edge: EdgeId,
        node: NodeId,
        side: &'static str,
    },

    #[error("edge `{0}` is a self-loop")]
    SelfLoop(EdgeId),

    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("workflow has no entry node (every node has an incoming edge)")]
    NoEntryNode,

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] fleet_core::KeyParseError),

    #[error("workflow `{0}` not found")]
    NotFound(WorkflowId),

    #[error("failed to read workflow directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize workflow: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to persist workflow atomically: {0}")]
    AtomicWrite(String),
}

impl Retryable for WorkflowError {
    fn is_retryable(&self) -> bool {
        false
    }
}
