//! The node handler trait and the engine-facing collaborator handlers
//! call back into (spec §4.3: `execute(resolvedNode, context, engine) →
//! output`).

use crate::error::NodeError;
use crate::services::Services;
use async_trait::async_trait;
use fleet_core::{NodeId, NodeTypeId, WorkflowId};
use fleet_execution::ExecutionContext;
use serde_json::Value;

/// A node with its `config` already resolved against the run's current
/// data and node outputs (spec §4.6 step 2 happens before a handler ever
/// sees a `ResolvedNode`).
pub struct ResolvedNode<'a> {
    pub id: &'a NodeId,
    pub node_type: &'a NodeTypeId,
    pub config: Value,
}

/// `action.execute_workflow`'s two dispatch modes (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Invoke the child run and await its completion.
    Sync,
    /// Enqueue the child run and return immediately.
    Dispatch,
}

/// The thin surface a node handler uses to reach back into the engine:
/// the configured `Services` bundle, and sub-workflow dispatch. Kept as
/// a trait (rather than a concrete `fleet-engine` type) so `fleet-action`
/// never depends on `fleet-engine` — `fleet-engine` implements this for
/// its own scheduler instead.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    fn services(&self) -> &Services;

    /// Dispatch `workflow_id` as a sub-workflow. `ancestry` is the
    /// current run's ancestor workflow-id chain (spec's reserved
    /// `_ancestry` context key) — the engine refuses to dispatch if
    /// `workflow_id` already appears in it (cycle prevention).
    async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        mode: DispatchMode,
        input: Value,
        ancestry: &[WorkflowId],
    ) -> Result<Value, NodeError>;
}

/// A registered node-type implementation (spec §4.3).
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError>;

    /// JSON-schema-flavored config shape, used by the builder UI. `None`
    /// means "no declared schema" (most built-ins needn't provide one).
    fn schema(&self) -> Option<Value> {
        None
    }

    /// One-line human summary.
    fn describe(&self) -> String;
}
