//! Execution Context (spec §4.5): per-run state shared across every node
//! handler invocation, with a `fork` operation for loop iterations.

use crate::status::{LogLevel, NodeStatus};
use chrono::{DateTime, Utc};
use fleet_core::{NodeId, RunId, WorkflowId};
use fleet_expression::template::{resolve_template_string, resolve_value, TemplateContext};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error as log_error};

/// One entry in `ExecutionContext.logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub node_id: Option<NodeId>,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

/// One entry in `ExecutionContext.errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub node_id: Option<NodeId>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry in `ExecutionContext.nodeStatusEvents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct Shared {
    data: Value,
    variables: HashMap<String, Value>,
    node_outputs: HashMap<NodeId, Value>,
    node_statuses: HashMap<NodeId, NodeStatus>,
    retry_attempts: HashMap<NodeId, u32>,
    logs: Vec<LogEntry>,
    errors: Vec<ErrorEntry>,
    node_status_events: Vec<StatusEvent>,
    last_log_at: Option<DateTime<Utc>>,
    last_progress_at: Option<DateTime<Utc>>,
}

/// Per-run mutable state. Cheap to clone (all state lives behind one
/// `Arc<RwLock<_>>`); clones are handles to the same context, not copies
/// of it — use [`ExecutionContext::fork`] for an independent child.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub cancellation: CancellationToken,
    shared: Arc<RwLock<Shared>>,
}

impl ExecutionContext {
    /// `data` is seeded from `workflow_variables < input < reserved keys`
    /// (later sources win); `variables` is a copy of `workflow_variables`
    /// (spec §4.5).
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        workflow_variables: HashMap<String, Value>,
        input: Value,
    ) -> Self {
        Self::with_run_id(RunId::v4(), workflow_id, workflow_name, workflow_variables, input)
    }

    /// Same as [`Self::new`], but for callers that must know the `runId`
    /// before the context exists — e.g. `action.execute_workflow`'s
    /// `dispatch` mode, which hands the id back to its caller before the
    /// spawned run has even built its context (spec §4.6).
    #[must_use]
    pub fn with_run_id(
        run_id: RunId,
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        workflow_variables: HashMap<String, Value>,
        input: Value,
    ) -> Self {
        let workflow_name = workflow_name.into();
        let mut data = Map::new();
        for (k, v) in &workflow_variables {
            data.insert(k.clone(), v.clone());
        }
        if let Value::Object(input_map) = input {
            for (k, v) in input_map {
                data.insert(k, v);
            }
        }
        data.insert("_workflowId".to_string(), Value::String(workflow_id.as_str().to_string()));
        data.insert("_workflowName".to_string(), Value::String(workflow_name.clone()));

        let now = Utc::now();
        Self {
            run_id,
            workflow_id,
            workflow_name,
            started_at: now,
            cancellation: CancellationToken::new(),
            shared: Arc::new(RwLock::new(Shared {
                data: Value::Object(data),
                variables: workflow_variables,
                last_log_at: None,
                last_progress_at: Some(now),
                ..Shared::default()
            })),
        }
    }

    fn node_outputs_snapshot(&self) -> HashMap<String, Value> {
        self.shared.read().node_outputs.iter().map(|(k, v)| (k.as_str().to_string(), v.clone())).collect()
    }

    /// Public alias of the node-outputs snapshot, used by callers building
    /// an [`fleet_expression::EvalContext`] outside this crate (the DAG
    /// Scheduler's edge-condition evaluation, spec §4.6).
    #[must_use]
    pub fn node_outputs_map(&self) -> HashMap<String, Value> {
        self.node_outputs_snapshot()
    }

    #[must_use]
    pub fn data_snapshot(&self) -> Value {
        self.shared.read().data.clone()
    }

    /// The only prescribed API for interpolation (spec §4.5).
    #[must_use]
    pub fn resolve(&self, template: &str) -> Value {
        let data = self.data_snapshot();
        let outputs = self.node_outputs_snapshot();
        let ctx = TemplateContext::new(&data, &outputs);
        resolve_template_string(template, &ctx)
    }

    /// Recursive template resolution over a node config tree before
    /// handler invocation (spec §4.1, §4.6 step 2).
    #[must_use]
    pub fn resolve_config(&self, config: &Value) -> Value {
        let data = self.data_snapshot();
        let outputs = self.node_outputs_snapshot();
        let ctx = TemplateContext::new(&data, &outputs);
        resolve_value(config, &ctx)
    }

    /// Merges `{key: value}` into `data` (used by `action.set_variable` —
    /// the one built-in node that mutates the run's data directly rather
    /// than only producing a node output).
    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        let mut shared = self.shared.write();
        deep_merge(&mut shared.data, serde_json::json!({ key.into(): value }));
    }

    pub fn set_node_output(&self, node_id: NodeId, output: Value) {
        self.shared.write().node_outputs.insert(node_id, output);
    }

    #[must_use]
    pub fn get_node_output(&self, node_id: &NodeId) -> Option<Value> {
        self.shared.read().node_outputs.get(node_id).cloned()
    }

    /// Records a `StatusEvent` and bumps `last_progress_at` (used by the
    /// Run Archive's stuck-run computation).
    pub fn set_node_status(&self, node_id: NodeId, status: NodeStatus) {
        let now = Utc::now();
        let mut shared = self.shared.write();
        shared.node_statuses.insert(node_id.clone(), status);
        shared.node_status_events.push(StatusEvent { node_id, status, timestamp: now });
        shared.last_progress_at = Some(now);
    }

    #[must_use]
    pub fn get_node_status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.shared.read().node_statuses.get(node_id).cloned()
    }

    #[must_use]
    pub fn node_statuses(&self) -> HashMap<NodeId, NodeStatus> {
        self.shared.read().node_statuses.clone()
    }

    pub fn retry_attempts(&self, node_id: &NodeId) -> u32 {
        self.shared.read().retry_attempts.get(node_id).copied().unwrap_or(0)
    }

    pub fn increment_retry_attempts(&self, node_id: &NodeId) -> u32 {
        let mut shared = self.shared.write();
        let entry = shared.retry_attempts.entry(node_id.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn log(&self, node_id: Option<NodeId>, message: impl Into<String>, level: LogLevel) {
        let now = Utc::now();
        let message = message.into();
        debug!(run_id = %self.run_id, node_id = ?node_id, %message, "workflow log");
        let mut shared = self.shared.write();
        shared.logs.push(LogEntry { node_id, message, level, timestamp: now });
        shared.last_log_at = Some(now);
    }

    /// Appends an `ErrorEntry` and logs it at `Error` level (spec §4.5).
    pub fn error(&self, node_id: Option<NodeId>, err: impl std::fmt::Display) {
        let message = err.to_string();
        log_error!(run_id = %self.run_id, node_id = ?node_id, error = %message, "workflow error");
        let now = Utc::now();
        let mut shared = self.shared.write();
        shared.errors.push(ErrorEntry { node_id: node_id.clone(), error: message.clone(), timestamp: now });
        shared.logs.push(LogEntry { node_id, message, level: LogLevel::Error, timestamp: now });
        shared.last_log_at = Some(now);
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.shared.read().errors.len()
    }

    #[must_use]
    pub fn log_count(&self) -> usize {
        self.shared.read().logs.len()
    }

    #[must_use]
    pub fn last_log_at(&self) -> Option<DateTime<Utc>> {
        self.shared.read().last_log_at
    }

    #[must_use]
    pub fn last_progress_at(&self) -> Option<DateTime<Utc>> {
        self.shared.read().last_progress_at
    }

    /// Returns a new, independent context whose `data` is `self`'s data
    /// deep-merged with `overrides`, whose `variables` are cloned, and
    /// whose `node_outputs` are shallow-copied (spec §4.5). Logs and
    /// errors start empty in the fork; merge them back into `self` with
    /// [`ExecutionContext::absorb_fork`] once the forked subgraph
    /// completes.
    #[must_use]
    pub fn fork(&self, overrides: Value) -> Self {
        let snapshot = self.shared.read();
        let mut data = snapshot.data.clone();
        deep_merge(&mut data, overrides);
        let forked = Shared {
            data,
            variables: snapshot.variables.clone(),
            node_outputs: snapshot.node_outputs.clone(),
            last_progress_at: snapshot.last_progress_at,
            ..Shared::default()
        };
        drop(snapshot);
        Self {
            run_id: self.run_id.clone(),
            workflow_id: self.workflow_id.clone(),
            workflow_name: self.workflow_name.clone(),
            started_at: self.started_at,
            cancellation: self.cancellation.clone(),
            shared: Arc::new(RwLock::new(forked)),
        }
    }

    /// Merge a fork's accumulated logs and errors back into `self`, in
    /// the order the fork recorded them.
    pub fn absorb_fork(&self, fork: &ExecutionContext) {
        let fork_shared = fork.shared.read();
        let mut shared = self.shared.write();
        shared.logs.extend(fork_shared.logs.iter().cloned());
        shared.errors.extend(fork_shared.errors.iter().cloned());
        if let Some(at) = fork_shared.last_log_at {
            shared.last_log_at = Some(shared.last_log_at.map_or(at, |cur| cur.max(at)));
        }
    }

    /// Renders the persisted `RunDetail` shape (spec §3/§4.8).
    #[must_use]
    pub fn to_json(&self, ended_at: Option<DateTime<Utc>>) -> Value {
        let shared = self.shared.read();
        serde_json::json!({
            "runId": self.run_id.to_string(),
            "workflowId": self.workflow_id.as_str(),
            "workflowName": self.workflow_name,
            "startedAt": self.started_at,
            "endedAt": ended_at,
            "data": shared.data,
            "variables": shared.variables,
            "nodeOutputs": shared.node_outputs.iter().map(|(k, v)| (k.as_str().to_string(), v.clone())).collect::<Map<_, _>>(),
            "nodeStatuses": shared.node_statuses.iter().map(|(k, v)| (k.as_str().to_string(), v.to_string())).collect::<Map<_, _>>(),
            "retryAttempts": shared.retry_attempts.iter().map(|(k, v)| (k.as_str().to_string(), Value::from(*v))).collect::<Map<_, _>>(),
            "logs": shared.logs,
            "errors": shared.errors,
            "nodeStatusEvents": shared.node_status_events,
        })
    }
}

/// Deep-merges `overrides` into `base` in place: object keys recurse,
/// everything else (including arrays) is replaced wholesale by the
/// override value.
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
