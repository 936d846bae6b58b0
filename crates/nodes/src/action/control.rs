//! `action.delay`, `action.set_variable`, `action.execute_workflow` (spec
//! §6, §4.6 "Sub-workflow dispatch").

use async_trait::async_trait;
use fleet_action::{DispatchMode, EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_core::WorkflowId;
use fleet_execution::ExecutionContext;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// `action.delay` — sleeps `config.ms` (default 0), observing cancellation.
pub struct DelayAction;

#[async_trait]
impl NodeHandler for DelayAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let ms = node.config.get("ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::select! {
            () = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "delayedMs": ms })),
        }
    }

    fn describe(&self) -> String {
        "sleeps for a fixed duration".into()
    }
}

/// `action.set_variable` — writes `config.name`/`config.value` straight
/// into `ctx.data` (spec §4.5: the one node type that mutates context data
/// directly rather than leaving mutation to `setNodeOutput`).
pub struct SetVariableAction;

#[async_trait]
impl NodeHandler for SetVariableAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let name = node
            .config
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("action.set_variable requires a string `name` config field".into()))?;
        let value = node.config.get("value").cloned().unwrap_or(Value::Null);
        ctx.set_data(name, value.clone());
        Ok(json!({ "name": name, "value": value }))
    }

    fn describe(&self) -> String {
        "writes a value into the run's data".into()
    }
}

/// `action.execute_workflow` — dispatches a sub-workflow (spec §4.6).
pub struct ExecuteWorkflowAction;

#[async_trait]
impl NodeHandler for ExecuteWorkflowAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let workflow_id_str = node
            .config
            .get("workflowId")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("action.execute_workflow requires a string `workflowId` config field".into()))?;
        let workflow_id = WorkflowId::new(workflow_id_str)
            .map_err(|e| NodeError::Validation(format!("invalid `workflowId`: {e}")))?;

        let mode = match node.config.get("mode").and_then(Value::as_str) {
            Some("dispatch") => DispatchMode::Dispatch,
            Some("sync") | None => DispatchMode::Sync,
            Some(other) => return Err(NodeError::Validation(format!("action.execute_workflow `mode` must be \"sync\" or \"dispatch\", got {other:?}"))),
        };

        let inherit_context = node.config.get("inheritContext").and_then(Value::as_bool).unwrap_or(false);
        let include_keys: Vec<String> = node
            .config
            .get("includeKeys")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default();
        let fail_on_child_error = node.config.get("failOnChildError").and_then(Value::as_bool).unwrap_or(false);
        let output_variable = node.config.get("outputVariable").and_then(Value::as_str).map(str::to_owned);

        let mut input = node.config.get("input").cloned().unwrap_or(Value::Object(Map::new()));
        if inherit_context {
            let data = ctx.data_snapshot();
            let mut merged = Map::new();
            if let Value::Object(data_map) = &data {
                if include_keys.is_empty() {
                    merged.extend(data_map.clone());
                } else {
                    for key in &include_keys {
                        if let Some(v) = data_map.get(key) {
                            merged.insert(key.clone(), v.clone());
                        }
                    }
                }
            }
            if let Value::Object(input_map) = input {
                merged.extend(input_map);
            }
            input = Value::Object(merged);
        }

        let ancestry: Vec<WorkflowId> = ctx
            .data_snapshot()
            .get("_ancestry")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().and_then(|s| WorkflowId::new(s).ok())).collect())
            .unwrap_or_default();

        let result = engine.execute_workflow(&workflow_id, mode, input, &ancestry).await;

        match result {
            Ok(output) => {
                if let Some(name) = output_variable {
                    let value = output.get("childOutput").cloned().unwrap_or_else(|| output.clone());
                    ctx.set_data(name, value);
                }
                Ok(output)
            }
            Err(err) if fail_on_child_error => Err(err),
            Err(err) => Ok(json!({ "status": "failed", "error": err.to_string() })),
        }
    }

    fn describe(&self) -> String {
        "invokes another workflow as a sub-run, synchronously or fire-and-forget".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_action::Services;
    use fleet_core::{NodeId, NodeTypeId};
    use std::collections::HashMap;

    struct StubEngine {
        services: Services,
    }

    #[async_trait]
    impl EngineHandle for StubEngine {
        fn services(&self) -> &Services {
            &self.services
        }
        async fn execute_workflow(
            &self,
            workflow_id: &WorkflowId,
            mode: DispatchMode,
            input: Value,
            _ancestry: &[WorkflowId],
        ) -> Result<Value, NodeError> {
            Ok(json!({
                "status": "completed",
                "runId": "run-1",
                "workflowId": workflow_id.as_str(),
                "mode": format!("{mode:?}"),
                "childInput": input,
                "childOutput": { "echoed": input },
            }))
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}))
    }

    fn engine() -> StubEngine {
        StubEngine { services: Services::default() }
    }

    #[tokio::test]
    async fn delay_waits_and_reports_duration() {
        let context = ctx();
        let id = NodeId::new("d1").unwrap();
        let ty = NodeTypeId::new("action.delay").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "ms": 5 }) };
        let out = DelayAction.execute(&node, &context, &engine()).await.unwrap();
        assert_eq!(out["delayedMs"], json!(5));
    }

    #[tokio::test]
    async fn set_variable_mutates_context_data() {
        let context = ctx();
        let id = NodeId::new("s1").unwrap();
        let ty = NodeTypeId::new("action.set_variable").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "name": "flag", "value": true }) };
        SetVariableAction.execute(&node, &context, &engine()).await.unwrap();
        assert_eq!(context.data_snapshot()["flag"], json!(true));
    }

    #[tokio::test]
    async fn execute_workflow_dispatches_sync_by_default() {
        let context = ctx();
        let id = NodeId::new("e1").unwrap();
        let ty = NodeTypeId::new("action.execute_workflow").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "workflowId": "template-child" }) };
        let out = ExecuteWorkflowAction.execute(&node, &context, &engine()).await.unwrap();
        assert_eq!(out["status"], json!("completed"));
        assert_eq!(out["mode"], json!("Sync"));
    }

    #[tokio::test]
    async fn execute_workflow_writes_output_variable_from_child_output() {
        let context = ctx();
        let id = NodeId::new("e1").unwrap();
        let ty = NodeTypeId::new("action.execute_workflow").unwrap();
        let node = ResolvedNode {
            id: &id,
            node_type: &ty,
            config: json!({ "workflowId": "template-child", "outputVariable": "childResult" }),
        };
        ExecuteWorkflowAction.execute(&node, &context, &engine()).await.unwrap();
        assert_eq!(context.data_snapshot()["childResult"], json!({ "echoed": {} }));
    }

    #[tokio::test]
    async fn execute_workflow_rejects_invalid_mode() {
        let context = ctx();
        let id = NodeId::new("e1").unwrap();
        let ty = NodeTypeId::new("action.execute_workflow").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "workflowId": "template-child", "mode": "bogus" }) };
        assert!(ExecuteWorkflowAction.execute(&node, &context, &engine()).await.is_err());
    }
}
