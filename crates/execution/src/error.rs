use fleet_core::{NodeId, RunId};
use fleet_error::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("run `{0}` was cancelled")]
    Cancelled(RunId),

    #[error("run `{0}` not found")]
    RunNotFound(RunId),

    #[error("node `{0}` has no recorded output")]
    NodeOutputMissing(NodeId),

    #[error("failed to (de)serialize execution state: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to persist run archive: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for ExecutionError {
    fn is_retryable(&self) -> bool {
        false
    }
}
