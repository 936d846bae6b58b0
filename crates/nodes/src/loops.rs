//! `loop.for_each` (spec §6, §4.6 "Loop fan-out").
//!
//! This handler only resolves `items`/`variable` into the shape the
//! scheduler's fan-out step (`run_loop_fanout` in `fleet-engine`)
//! consumes — the actual per-iteration forking, execution, and result
//! collection happens in the scheduler, not here, since it needs access
//! to the workflow graph's downstream nodes.

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};

pub struct ForEachNode;

#[async_trait]
impl NodeHandler for ForEachNode {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let items = node
            .config
            .get("items")
            .cloned()
            .ok_or_else(|| NodeError::Validation("loop.for_each requires an `items` config field".into()))?;

        let items = match items {
            Value::Array(arr) => arr,
            Value::String(s) => serde_json::from_str::<Vec<Value>>(&s)
                .map_err(|e| NodeError::Validation(format!("loop.for_each `items` string did not parse as a JSON array: {e}")))?,
            other => return Err(NodeError::Validation(format!("loop.for_each `items` must be an array, got {other}"))),
        };

        let variable = node
            .config
            .get("variable")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("loop.for_each requires a string `variable` config field".into()))?;

        Ok(json!({ "items": items, "variable": variable }))
    }

    fn describe(&self) -> String {
        "fans out its downstream subgraph once per item, forking the run context each time".into()
    }
}
