//! `notify.*` node handlers (spec §6).

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::{ExecutionContext, LogLevel};
use serde_json::{json, Value};

fn parse_level(s: Option<&str>) -> LogLevel {
    match s {
        Some("debug") => LogLevel::Debug,
        Some("warn") => LogLevel::Warn,
        Some("error") => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// `notify.log` — appends a message to the run's log trail at
/// `config.level` (default `info`).
pub struct LogNotify;

#[async_trait]
impl NodeHandler for LogNotify {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let message = node
            .config
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("notify.log requires a string `message` config field".into()))?;
        let level = parse_level(node.config.get("level").and_then(Value::as_str));
        ctx.log(Some(node.id.clone()), message, level);
        Ok(json!({ "logged": true }))
    }

    fn describe(&self) -> String {
        "appends a message to the run's log trail".into()
    }
}

/// `notify.telegram` — forwards `config.message` to the `telegram` service
/// port.
pub struct TelegramNotify;

#[async_trait]
impl NodeHandler for TelegramNotify {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let message = node
            .config
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Validation("notify.telegram requires a string `message` config field".into()))?;
        engine.services().telegram()?.send(message).await?;
        Ok(json!({ "sent": true }))
    }

    fn describe(&self) -> String {
        "sends a message through the configured Telegram bot".into()
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
    async fn log_notify_records_a_log_entry() {
        let ctx = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
        let id = NodeId::new("n1").unwrap();
        let ty = NodeTypeId::new("notify.log").unwrap();
        let node = ResolvedNode { id: &id, node_type: &ty, config: json!({ "message": "hi", "level": "warn" }) };
        let out = LogNotify.execute(&node, &ctx, &NoEngine).await.unwrap();
        assert_eq!(out["logged"], json!(true));
        assert_eq!(ctx.log_count(), 1);
    }
}
