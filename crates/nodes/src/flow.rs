//! `flow.gate` (spec §6, §5 "Suspension points" (d): "gate polling for
//! `flow.gate` nodes").

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use fleet_expression::{eval_edge_condition, EvalContext};
use serde_json::{json, Value};
use std::time::Duration;

/// Polls `config.condition` (an expression string) every
/// `config.pollIntervalMs` (default 1000) until it's truthy. The
/// scheduler's own per-node timeout (spec §4.6 step 4) is what ultimately
/// bounds how long this polling loop may run — this handler has no
/// timeout of its own, it only honors cancellation between polls.
pub struct GateNode;

#[async_trait]
impl NodeHandler for GateNode {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let condition = node
            .config
            .get("condition")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("flow.gate requires a string `condition` config field".into()))?;
        let poll_interval_ms = node.config.get("pollIntervalMs").and_then(Value::as_u64).unwrap_or(1000);

        loop {
            if ctx.cancellation.is_cancelled() {
                return Err(NodeError::Cancelled);
            }

            let node_outputs = ctx.node_outputs_map();
            let eval_ctx = EvalContext { output: Value::Null, data: ctx.data_snapshot(), status: Value::Null, node_outputs };
            if eval_edge_condition(condition, &eval_ctx) {
                return Ok(json!({ "passed": true }));
            }

            tokio::select! {
                () = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                () = tokio::time::sleep(Duration::from_millis(poll_interval_ms)) => {}
            }
        }
    }

    fn describe(&self) -> String {
        "blocks downstream nodes until its condition expression becomes true".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{NodeId, NodeTypeId, WorkflowId};
    use std::collections::HashMap;

    struct NoEngine;
    #[async_trait]
    impl EngineHandle for NoEngine {
        fn services(&self) -> &fleet_action::Services {
            unimplemented!()
        }
        async fn execute_workflow(
            &self,
            _workflow_id: &WorkflowId,
            _mode: fleet_action::DispatchMode,
            _input: Value,
            _ancestry: &[WorkflowId],
        ) -> Result<Value, NodeError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn gate_passes_immediately_when_condition_already_true() {
        let ctx = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({ "ready": true }));
        let id = NodeId::new("g1").unwrap();
        let ty = NodeTypeId::new("flow.gate").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "condition": "$data.ready === true", "pollIntervalMs": 5 }) };
        let out = tokio::time::timeout(Duration::from_secs(1), GateNode.execute(&node, &ctx, &NoEngine)).await.unwrap().unwrap();
        assert_eq!(out["passed"], json!(true));
    }

    #[tokio::test]
    async fn gate_rejects_when_cancelled() {
        let ctx = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({ "ready": false }));
        ctx.cancellation.cancel();
        let id = NodeId::new("g1").unwrap();
        let ty = NodeTypeId::new("flow.gate").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "condition": "$data.ready === true" }) };
        let err = GateNode.execute(&node, &ctx, &NoEngine).await.unwrap_err();
        assert!(matches!(err, NodeError::Cancelled));
    }
}
