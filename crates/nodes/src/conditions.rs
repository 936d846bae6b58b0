//! `condition.*` node handlers (spec §6, §4.2).

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use fleet_expression::{eval_str, EvalContext};
use serde_json::{json, Value};
use std::collections::HashMap;

/// `condition.expression` — evaluates `config.expression` against
/// `$output` (the node named by `config.node`, or `Null` if unset),
/// `$data`, `$status`, `$ctx`. Unlike edge-condition evaluation, a
/// throwing expression fails the *node* with the exception message
/// (spec §4.2: "for `condition.expression` nodes the node fails with the
/// exception message").
pub struct ExpressionCondition;

#[async_trait]
impl NodeHandler for ExpressionCondition {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let expression = node
            .config
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("condition.expression requires a string `expression` config field".into()))?;

        let node_outputs = ctx.node_outputs_map();
        let named_output = node
            .config
            .get("node")
            .and_then(Value::as_str)
            .map(|named| node_outputs.get(named).cloned().unwrap_or(Value::Null))
            .unwrap_or(Value::Null);

        let eval_ctx = EvalContext::for_condition_node(named_output, ctx.data_snapshot(), node_outputs);
        let value = eval_str(expression, &eval_ctx)?;
        Ok(json!({ "result": fleet_expression::is_truthy(&value), "value": value }))
    }

    fn describe(&self) -> String {
        "evaluates a boolean expression against the run's data and node outputs".into()
    }
}

/// `condition.switch` — evaluates `config.value`, matches the resolved
/// value (stringified) against `config.cases` (a map from case key to
/// `sourcePort`), and reports `matchedPort` for the scheduler's
/// source-port routing (spec §4.6 "Source-port routing"). Falls back to
/// `config.defaultPort` (default `"default"`) when no case matches.
pub struct SwitchCondition;

#[async_trait]
impl NodeHandler for SwitchCondition {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let value_expr = node
            .config
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("condition.switch requires a string `value` config field".into()))?;

        let node_outputs = ctx.node_outputs_map();
        let eval_ctx = EvalContext { output: Value::Null, data: ctx.data_snapshot(), status: Value::Null, node_outputs };
        let resolved_value = eval_str(value_expr, &eval_ctx)?;
        let key = match &resolved_value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let cases = node.config.get("cases").and_then(Value::as_object);
        let matched_port = cases
            .and_then(|cases| cases.get(&key))
            .and_then(Value::as_str)
            .or_else(|| node.config.get("defaultPort").and_then(Value::as_str))
            .unwrap_or("default");

        Ok(json!({ "matchedPort": matched_port, "value": resolved_value }))
    }

    fn describe(&self) -> String {
        "routes downstream via sourcePort based on a matched case value".into()
    }
}

/// `condition.slot_available` — checks whether the shared slot registry
/// (also touched by `action.allocate_slot`/`action.release_slot`) has
/// capacity left for `config.resource` (default `"default"`).
pub struct SlotAvailableCondition {
    slots: crate::slots::SlotRegistry,
}

impl SlotAvailableCondition {
    #[must_use]
    pub fn new(slots: crate::slots::SlotRegistry) -> Self {
        Self { slots }
    }
}

#[async_trait]
impl NodeHandler for SlotAvailableCondition {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let resource = node.config.get("resource").and_then(Value::as_str).unwrap_or("default");
        let capacity = node.config.get("capacity").and_then(Value::as_u64).unwrap_or(1) as usize;
        let (available, in_use) = self.slots.available(resource, capacity);
        Ok(json!({ "triggered": available, "result": available, "inUse": in_use, "capacity": capacity }))
    }

    fn describe(&self) -> String {
        "reports whether the named resource's concurrency slots have room left".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{NodeId, NodeTypeId, WorkflowId};

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

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({ "n": 42 }))
    }

    fn node(config: Value) -> (NodeId, NodeTypeId, Value) {
        (NodeId::new("c1").unwrap(), NodeTypeId::new("condition.expression").unwrap(), config)
    }

    #[tokio::test]
    async fn expression_condition_evaluates_against_data() {
        let context = ctx();
        let (id, ty, config) = node(json!({ "expression": "$data.n > 10" }));
        let resolved = ResolvedNode { id: &id, node_type: &ty, config };
        let out = ExpressionCondition.execute(&resolved, &context, &NoEngine).await.unwrap();
        assert_eq!(out["result"], json!(true));
    }

    #[tokio::test]
    async fn expression_condition_propagates_eval_errors() {
        let context = ctx();
        let (id, ty, config) = node(json!({ "expression": "$data.n +" }));
        let resolved = ResolvedNode { id: &id, node_type: &ty, config };
        assert!(ExpressionCondition.execute(&resolved, &context, &NoEngine).await.is_err());
    }

    #[tokio::test]
    async fn switch_routes_to_matching_case() {
        let context = ctx();
        let (id, ty, config) = node(json!({ "value": "'left'", "cases": {"left": "L", "right": "R"} }));
        let resolved = ResolvedNode { id: &id, node_type: &ty, config };
        let out = SwitchCondition.execute(&resolved, &context, &NoEngine).await.unwrap();
        assert_eq!(out["matchedPort"], json!("L"));
    }

    #[tokio::test]
    async fn switch_falls_back_to_default_port() {
        let context = ctx();
        let (id, ty, config) = node(json!({ "value": "'unknown'", "cases": {"left": "L"} }));
        let resolved = ResolvedNode { id: &id, node_type: &ty, config };
        let out = SwitchCondition.execute(&resolved, &context, &NoEngine).await.unwrap();
        assert_eq!(out["matchedPort"], json!("default"));
    }

    #[tokio::test]
    async fn slot_available_reports_capacity() {
        let context = ctx();
        let slots = crate::slots::SlotRegistry::default();
        let handler = SlotAvailableCondition::new(slots);
        let (id, ty, config) = node(json!({ "resource": "worktrees", "capacity": 2 }));
        let resolved = ResolvedNode { id: &id, node_type: &ty, config };
        let out = handler.execute(&resolved, &context, &NoEngine).await.unwrap();
        assert_eq!(out["triggered"], json!(true));
    }
}
