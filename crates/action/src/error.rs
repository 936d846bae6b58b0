use fleet_core::NodeTypeId;
use fleet_error::Retryable;
use serde_json::Value;
use thiserror::Error;

/// Errors a node handler or service port can return.
///
/// Distinguishes retryable from fatal failures so the DAG Scheduler can
/// decide retry policy without the handler needing to know about
/// backoff or attempt counts itself.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// Transient failure — the scheduler may retry per its own policy.
    #[error("retryable: {message}")]
    Retryable {
        message: String,
        /// Suggested delay; the scheduler's own backoff computation wins.
        backoff_hint_ms: Option<u64>,
    },

    /// Permanent failure — never retried.
    #[error("fatal: {message}")]
    Fatal { message: String, details: Option<Value> },

    /// Input failed validation before execution began.
    #[error("validation: {0}")]
    Validation(String),

    /// `node.type` has no registered handler (spec §3: "unknown type
    /// fails the node with a fatal, non-retryable error").
    #[error("unregistered node type `{0}`")]
    UnregisteredType(NodeTypeId),

    /// A required `Services` port was not configured.
    #[error("service `{0}` is not configured")]
    ServiceUnavailable(&'static str),

    /// Execution was cancelled via the run's cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// A `condition.expression` node's expression threw (spec §4.2).
    #[error("expression error: {0}")]
    Expression(#[from] fleet_expression::ExpressionError),
}

impl Retryable for NodeError {
    fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Retryable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_variant_is_retryable() {
        assert!(NodeError::Retryable { message: "x".into(), backoff_hint_ms: None }.is_retryable());
        assert!(!NodeError::Fatal { message: "x".into(), details: None }.is_retryable());
        assert!(!NodeError::Validation("x".into()).is_retryable());
        assert!(!NodeError::Cancelled.is_retryable());
    }

    #[test]
    fn unregistered_type_is_not_retryable() {
        let err = NodeError::UnregisteredType(NodeTypeId::new("action.bogus").unwrap());
        assert!(!err.is_retryable());
    }
}
