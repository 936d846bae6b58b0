use fleet_core::{NodeId, WorkflowId};
use fleet_error::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow `{0}` not found")]
    WorkflowMissing(WorkflowId),

    #[error("workflow has no entry node")]
    NoEntryNode,

    #[error("node `{node_id}` failed: {source}")]
    NodeFailed { node_id: NodeId, #[source] source: fleet_action::NodeError },

    #[error("run was cancelled")]
    Cancelled,

    #[error("sub-workflow dispatch would cycle back to `{0}`")]
    CyclicDispatch(WorkflowId),

    #[error(transparent)]
    Workflow(#[from] fleet_workflow::WorkflowError),

    #[error(transparent)]
    Execution(#[from] fleet_execution::ExecutionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        false
    }
}
