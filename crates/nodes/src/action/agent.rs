//! Agent-pool-facing `action.*` handlers (spec §6).
//!
//! The `"auto"` executor-resolution behavior named in spec §9's open
//! question is deliberately *not* re-derived from undocumented source
//! control flow here — `resolve_executor` externalizes it to the
//! `config` service port instead.

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};
use std::time::Duration;

fn config_str<'a>(config: &'a Value, key: &str, node_type: &str) -> Result<&'a str, NodeError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::Validation(format!("{node_type} requires a string `{key}` config field")))
}

fn outcome_to_json(outcome: fleet_action::AgentRunOutcome) -> Value {
    json!({ "success": outcome.success, "output": outcome.output, "threadId": outcome.thread_id })
}

/// `action.run_agent` — launches an ephemeral agent thread for `config.prompt`.
pub struct RunAgentAction;

#[async_trait]
impl NodeHandler for RunAgentAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let prompt = config_str(&node.config, "prompt", "action.run_agent")?;
        let cwd = node.config.get("cwd").and_then(Value::as_str).unwrap_or(".");
        let timeout_ms = node.config.get("timeoutMs").and_then(Value::as_u64).unwrap_or(600_000);

        let outcome = engine.services().agent_pool()?.launch_ephemeral_thread(prompt, cwd, timeout_ms).await?;
        Ok(outcome_to_json(outcome))
    }

    fn describe(&self) -> String {
        "launches an ephemeral agent thread for a prompt".into()
    }
}

/// `action.run_planner` — runs an agent thread whose job is to propose a
/// task breakdown, parsing its output as a JSON array when possible so
/// downstream `action.materialize_planner_tasks` can consume it directly.
pub struct RunPlannerAction;

#[async_trait]
impl NodeHandler for RunPlannerAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let goal = config_str(&node.config, "goal", "action.run_planner")?;
        let cwd = node.config.get("cwd").and_then(Value::as_str).unwrap_or(".");
        let timeout_ms = node.config.get("timeoutMs").and_then(Value::as_u64).unwrap_or(600_000);
        let max_retries = node.config.get("maxRetries").and_then(Value::as_u64).unwrap_or(1) as u32;

        let prompt = format!("{goal}\n\nRespond with a JSON array of tasks, each an object with `title` and `description`.");
        let outcome = engine.services().agent_pool()?.exec_with_retry(&prompt, cwd, timeout_ms, max_retries).await?;

        let tasks = serde_json::from_str::<Vec<Value>>(&outcome.output).unwrap_or_default();
        Ok(json!({ "success": outcome.success, "output": outcome.output, "tasks": tasks, "threadId": outcome.thread_id }))
    }

    fn describe(&self) -> String {
        "runs an agent thread that proposes a task breakdown".into()
    }
}

/// `action.run_command` — the engine never evaluates arbitrary user code
/// itself (spec §1 Non-goals), so this delegates the requested command to
/// the agent pool's retrying executor rather than shelling out directly.
pub struct RunCommandAction;

#[async_trait]
impl NodeHandler for RunCommandAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let command = config_str(&node.config, "command", "action.run_command")?;
        let cwd = node.config.get("cwd").and_then(Value::as_str).unwrap_or(".");
        let timeout_ms = node.config.get("timeoutMs").and_then(Value::as_u64).unwrap_or(600_000);
        let max_retries = node.config.get("maxRetries").and_then(Value::as_u64).unwrap_or(0) as u32;

        let prompt = format!("Run this command and report its output verbatim: {command}");
        let outcome = engine.services().agent_pool()?.exec_with_retry(&prompt, cwd, timeout_ms, max_retries).await?;
        Ok(outcome_to_json(outcome))
    }

    fn describe(&self) -> String {
        "runs a shell command through the agent pool's sandboxed executor".into()
    }
}

/// `action.build_task_prompt` — composes a kanban task's fields into a
/// single prompt string for downstream `action.run_agent` nodes. Pure
/// formatting; touches no service port.
pub struct BuildTaskPromptAction;

#[async_trait]
impl NodeHandler for BuildTaskPromptAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let task = node
            .config
            .get("task")
            .ok_or_else(|| NodeError::Validation("action.build_task_prompt requires a `task` config field".into()))?;

        let title = task.get("title").and_then(Value::as_str).unwrap_or("Untitled task");
        let description = task.get("description").and_then(Value::as_str).unwrap_or("");
        let acceptance_criteria = task.get("acceptanceCriteria").and_then(Value::as_array);

        let mut prompt = format!("# {title}\n\n{description}\n");
        if let Some(criteria) = acceptance_criteria {
            prompt.push_str("\n## Acceptance criteria\n");
            for item in criteria {
                if let Some(text) = item.as_str() {
                    prompt.push_str(&format!("- {text}\n"));
                }
            }
        }
        if let Some(extra) = node.config.get("extraInstructions").and_then(Value::as_str) {
            prompt.push_str(&format!("\n{extra}\n"));
        }

        Ok(json!({ "prompt": prompt }))
    }

    fn describe(&self) -> String {
        "composes a task's fields into a single agent prompt".into()
    }
}

/// `action.resolve_executor` — resolves `config.executor`, externalizing
/// `"auto"` resolution to the `config` service port rather than guessing
/// an environment-variable priority order (spec §9 open question).
pub struct ResolveExecutorAction;

#[async_trait]
impl NodeHandler for ResolveExecutorAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let requested = node.config.get("executor").and_then(Value::as_str).unwrap_or("auto");

        let resolved = if requested == "auto" {
            let fallback = node.config.get("defaultExecutor").cloned().unwrap_or(json!("claude"));
            let value = engine.services().config()?.get("executor.default", Some(fallback));
            value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string())
        } else {
            requested.to_string()
        };

        Ok(json!({ "executor": resolved }))
    }

    fn describe(&self) -> String {
        "resolves the agent SDK to use, deferring \"auto\" to configuration".into()
    }
}

/// `action.handle_rate_limit` — waits out `config.retryAfterMs`, optionally
/// releasing a task claim first so another agent can pick it up while this
/// one cools down.
pub struct HandleRateLimitAction;

#[async_trait]
impl NodeHandler for HandleRateLimitAction {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let retry_after_ms = node.config.get("retryAfterMs").and_then(Value::as_u64).unwrap_or(60_000);

        if node.config.get("releaseClaim").and_then(Value::as_bool).unwrap_or(false) {
            if let Some(task_id) = node.config.get("taskId").and_then(Value::as_str) {
                engine.services().claims()?.release(task_id).await?;
            }
        }

        tokio::select! {
            () = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            () = tokio::time::sleep(Duration::from_millis(retry_after_ms)) => Ok(json!({ "waitedMs": retry_after_ms })),
        }
    }

    fn describe(&self) -> String {
        "backs off for a rate-limit cooldown, optionally releasing a task claim".into()
    }
}
