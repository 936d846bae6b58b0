//! `trigger.*` node handlers (spec §6, §4.7).
//!
//! Every handler returns `{"triggered": bool, ...}`; the Trigger
//! Dispatcher treats `triggered === true` as a fire decision (spec
//! §4.7). Event-capable subtypes (`event`, `pr_event`, `task_assigned`,
//! `anomaly`, `webhook`) are invoked by `Engine::evaluate_event_triggers`
//! with `$data.event`/`$data.eventType` seeded from the incoming event;
//! the rest (`manual`, `schedule`, `scheduled_once`, `task_available`,
//! `meeting.wake_phrase`) are invoked on their own tick by
//! `Engine::poll_triggers`.

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};

fn config_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// `trigger.manual` — always fires; a human (or CLI) asked for this run.
pub struct ManualTrigger;

#[async_trait]
impl NodeHandler for ManualTrigger {
    async fn execute(&self, _node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        Ok(json!({ "triggered": true, "reason": "manual" }))
    }

    fn describe(&self) -> String {
        "fires unconditionally when manually invoked".into()
    }
}

/// `trigger.schedule` — fires on every poll tick; the actual cron/interval
/// bookkeeping lives in the caller's scheduler loop, not here (this node
/// only describes *that* it's schedule-driven).
pub struct ScheduleTrigger;

#[async_trait]
impl NodeHandler for ScheduleTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let cron = config_str(&node.config, "cron").unwrap_or("*/5 * * * *");
        Ok(json!({ "triggered": true, "cron": cron }))
    }

    fn describe(&self) -> String {
        "fires on every poll tick per its cron/interval config".into()
    }
}

/// `trigger.scheduled_once` — fires only if `config.firedAt` has not
/// already been stamped, then reports that it should be disabled after
/// firing (the caller is responsible for persisting that back to the
/// workflow's `enabled`/config field — this node has no write access to
/// the Workflow Store).
pub struct ScheduledOnceTrigger;

#[async_trait]
impl NodeHandler for ScheduledOnceTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let already_fired = node.config.get("firedAt").and_then(Value::as_str).is_some();
        Ok(json!({ "triggered": !already_fired, "disableAfterFire": true }))
    }

    fn describe(&self) -> String {
        "fires once at its configured time, then should be disabled".into()
    }
}

/// Generic event-capable trigger shared by `event`/`pr_event`/
/// `task_assigned`/`webhook`: fires when `config.eventType` (if set)
/// matches `$data.eventType`, and `config.filter` (a template) resolves
/// to a non-empty, non-false value.
struct FilteredEventTrigger {
    label: &'static str,
}

#[async_trait]
impl NodeHandler for FilteredEventTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let data = ctx.data_snapshot();
        let incoming_event_type = data.get("eventType").and_then(Value::as_str).unwrap_or("");

        if let Some(expected) = config_str(&node.config, "eventType") {
            if expected != incoming_event_type {
                return Ok(json!({ "triggered": false }));
            }
        }

        let filter_passes = match node.config.get("filter") {
            Some(Value::String(expr)) => {
                let eval_ctx = fleet_expression::EvalContext {
                    output: data.get("event").cloned().unwrap_or(Value::Null),
                    data: data.clone(),
                    status: Value::Null,
                    node_outputs: std::collections::HashMap::new(),
                };
                fleet_expression::eval_edge_condition(expr, &eval_ctx)
            }
            _ => true,
        };

        Ok(json!({ "triggered": filter_passes, "eventType": incoming_event_type }))
    }

    fn describe(&self) -> String {
        format!("fires on `{}` events matching its configured filter", self.label)
    }
}

#[must_use]
pub fn event_trigger() -> impl NodeHandler {
    FilteredEventTrigger { label: "event" }
}

#[must_use]
pub fn pr_event_trigger() -> impl NodeHandler {
    FilteredEventTrigger { label: "pr_event" }
}

#[must_use]
pub fn task_assigned_trigger() -> impl NodeHandler {
    FilteredEventTrigger { label: "task_assigned" }
}

#[must_use]
pub fn webhook_trigger() -> impl NodeHandler {
    FilteredEventTrigger { label: "webhook" }
}

/// `trigger.anomaly` — per spec §9's open question, cooldown bookkeeping
/// lives outside this engine (in the external anomaly-analyzer
/// collaborator); this handler only honors a pre-computed
/// `$data.event.cooldownOk` flag rather than tracking cooldowns itself.
pub struct AnomalyTrigger;

#[async_trait]
impl NodeHandler for AnomalyTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let data = ctx.data_snapshot();
        let event = data.get("event").cloned().unwrap_or(Value::Null);
        let cooldown_ok = event.get("cooldownOk").and_then(Value::as_bool).unwrap_or(true);

        let expected_kind = config_str(&node.config, "anomalyType");
        let kind_matches = match (expected_kind, event.get("anomalyType").and_then(Value::as_str)) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, _) => true,
        };

        Ok(json!({ "triggered": cooldown_ok && kind_matches, "cooldownOk": cooldown_ok }))
    }

    fn describe(&self) -> String {
        "fires on anomaly events whose cooldown has already cleared".into()
    }
}

/// `trigger.task_available` — polled, not event-driven: fires when
/// `config.minSlots` (default 1) is at or below the caller-supplied
/// `$data.availableSlots` (seeded by the poll loop from the kanban
/// collaborator's queue depth).
pub struct TaskAvailableTrigger;

#[async_trait]
impl NodeHandler for TaskAvailableTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let min_slots = node.config.get("minSlots").and_then(Value::as_u64).unwrap_or(1);
        let available = ctx.data_snapshot().get("availableSlots").and_then(Value::as_u64).unwrap_or(0);
        Ok(json!({ "triggered": available >= min_slots, "availableSlots": available }))
    }

    fn describe(&self) -> String {
        "fires when at least minSlots tasks are available to claim".into()
    }
}

/// `meeting.wake_phrase` — polled transcript watcher: fires when
/// `config.phrase` appears (case-insensitively) in `$data.transcriptTail`.
pub struct WakePhraseTrigger;

#[async_trait]
impl NodeHandler for WakePhraseTrigger {
    async fn execute(&self, node: &ResolvedNode<'_>, ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let phrase = config_str(&node.config, "phrase").unwrap_or("hey fleet").to_lowercase();
        let tail = ctx.data_snapshot().get("transcriptTail").and_then(Value::as_str).map(str::to_lowercase).unwrap_or_default();
        Ok(json!({ "triggered": tail.contains(&phrase) }))
    }

    fn describe(&self) -> String {
        "fires when its wake phrase appears in the meeting transcript tail".into()
    }
}
