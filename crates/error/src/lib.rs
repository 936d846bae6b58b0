//! # Fleet Error
//!
//! Cross-cutting error plumbing shared by every crate's own `thiserror`
//! error enum (`fleet_expression::ExpressionError`,
//! `fleet_workflow::WorkflowError`, `fleet_execution::ExecutionError`,
//! `fleet_action::NodeError`, `fleet_engine::EngineError`, ...). This crate
//! intentionally does not define one giant error type — see `DESIGN.md` for
//! why the per-crate `thiserror` pattern was kept instead.

use chrono::{DateTime, Utc};
use fleet_core::{NodeId, RunId};
use serde::{Deserialize, Serialize};

/// Where and when an error occurred, attached to a domain error so the Run
/// Archive and the scheduler's abort path can report `{nodeId, error,
/// timestamp}` (spec §3 `ExecutionContext.errors`) without every error enum
/// re-deriving the same three fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// The run this error occurred within, if any.
    pub run_id: Option<RunId>,
    /// The node this error occurred within, if any.
    pub node_id: Option<NodeId>,
    /// When the error was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl ErrorContext {
    /// Build a context stamped with the current time.
    #[must_use]
    pub fn new(run_id: Option<RunId>, node_id: Option<NodeId>) -> Self {
        Self {
            run_id,
            node_id,
            occurred_at: Utc::now(),
        }
    }

    /// Build a context scoped to a single node within a run.
    #[must_use]
    pub fn for_node(run_id: RunId, node_id: NodeId) -> Self {
        Self::new(Some(run_id), Some(node_id))
    }
}

/// Lets the DAG Scheduler ask any domain error whether it should be retried
/// without downcasting to a concrete type (spec §4.6 step 6: "On failure
/// and attempts remain").
///
/// Implemented by each crate's own error enum; the scheduler only ever sees
/// `&dyn Retryable` through the handler's `Result<_, E: Retryable>` bound.
pub trait Retryable {
    /// Returns `true` if the DAG Scheduler's retry loop should re-attempt
    /// the node after this error, `false` if it is fatal.
    fn is_retryable(&self) -> bool;
}
