//! The engine façade (spec §2 data-flow, §4.6's "engine" parameter, §4.7
//! Trigger Dispatcher): owns the Node Registry, Workflow Store, Run
//! Archive, `Services` bundle, and `EngineConfig`, and ties them together
//! into `run`/`dispatch`/`evaluate_event_triggers`.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scheduler::{self, RunOutcome};
use fleet_action::{DispatchMode, EngineHandle, NodeError, NodeRegistry, ResolvedNode, Services};
use fleet_core::{NodeId, RunId, WorkflowId};
use fleet_execution::{ExecutionContext, RunArchive, RunSummary, TriggerInfo, WorkflowStatus};
use fleet_workflow::{WorkflowDefinition, WorkflowStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

struct Inner {
    registry: NodeRegistry,
    store: WorkflowStore,
    archive: RunArchive,
    services: Services,
    config: EngineConfig,
}

/// Cheap handle — clones share the same registry, store, archive, and
/// service bundle (spec §5: "the engine is fully concurrent and each run
/// owns its own context").
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    #[must_use]
    pub fn new(registry: NodeRegistry, store: WorkflowStore, archive: RunArchive, services: Services, config: EngineConfig) -> Self {
        Self { inner: Arc::new(Inner { registry, store, archive, services, config }) }
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn store(&self) -> &WorkflowStore {
        &self.inner.store
    }

    #[must_use]
    pub fn archive(&self) -> &RunArchive {
        &self.inner.archive
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    /// Used by the scheduler when spawning per-node tasks — returns an
    /// owned handle cheap enough to move into a `tokio::spawn`.
    #[must_use]
    pub(crate) fn clone_handle(&self) -> Engine {
        self.clone()
    }

    /// Load, validate, and return a workflow definition, or `WorkflowMissing`.
    fn load_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDefinition, EngineError> {
        self.inner.store.get(workflow_id).ok_or_else(|| EngineError::WorkflowMissing(workflow_id.clone()))
    }

    /// Run `workflow_id` to completion with `input` and `trigger` metadata,
    /// no ancestry (a top-level run). This is the entry point the Trigger
    /// Dispatcher and CLI use.
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id))]
    pub async fn run(&self, workflow_id: &WorkflowId, input: Value, trigger: TriggerInfo) -> Result<RunReport, EngineError> {
        self.run_with_ancestry(workflow_id, input, trigger, Vec::new()).await
    }

    /// Run `workflow_id` to completion, seeding the reserved `_ancestry`
    /// context key so sub-workflow dispatch can detect cycles (spec §4.6
    /// "Sub-workflow dispatch"). Mints a fresh `runId` itself — callers that
    /// need to know the id before the run finishes (fire-and-forget
    /// dispatch) should use [`Self::run_with_ancestry_and_id`] instead.
    async fn run_with_ancestry(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
        trigger: TriggerInfo,
        ancestry: Vec<WorkflowId>,
    ) -> Result<RunReport, EngineError> {
        self.run_with_ancestry_and_id(RunId::v4(), workflow_id, input, trigger, ancestry).await
    }

    /// Same as [`Self::run_with_ancestry`], but with the `runId` supplied by
    /// the caller rather than minted here — lets `action.execute_workflow`'s
    /// `dispatch` mode hand the run id back before the spawned run has even
    /// started (spec §4.6: dispatch "returns immediately with
    /// `{status: "dispatched", runId}`").
    async fn run_with_ancestry_and_id(
        &self,
        run_id: RunId,
        workflow_id: &WorkflowId,
        input: Value,
        trigger: TriggerInfo,
        ancestry: Vec<WorkflowId>,
    ) -> Result<RunReport, EngineError> {
        let workflow = self.load_workflow(workflow_id)?;
        fleet_workflow::dag::validate(&workflow)?;

        let mut seeded_input = input;
        if let Value::Object(ref mut map) = seeded_input {
            map.insert("_ancestry".to_string(), json!(ancestry.iter().map(WorkflowId::as_str).collect::<Vec<_>>()));
        }

        let context =
            ExecutionContext::with_run_id(run_id, workflow.id.clone(), workflow.name.clone(), workflow.variables.clone(), seeded_input);
        self.inner.archive.register_running(context.clone());

        let outcome = scheduler::run_graph(self, &workflow, &context, &self.inner.config).await;

        let (status, error) = match &outcome {
            RunOutcome::Completed if context.error_count() == 0 => (WorkflowStatus::Completed, None),
            RunOutcome::Completed => (WorkflowStatus::Failed, None),
            RunOutcome::Failed(err) => (WorkflowStatus::Failed, Some(err.to_string())),
            RunOutcome::Cancelled => (WorkflowStatus::Cancelled, None),
        };

        let ended_at = chrono::Utc::now();
        let summary = RunSummary::compute(&context, status, Some(ended_at), workflow.nodes.len(), self.inner.config.run_stuck_threshold_ms, trigger);
        let detail = context.to_json(Some(ended_at));

        self.inner.archive.unregister_running(&context.run_id);
        if let Err(err) = self.inner.archive.finalize(summary.clone(), detail.clone()) {
            // Persistence failures are logged, never fatal (spec §7 "Persistence").
            tracing::warn!(run_id = %context.run_id, error = %err, "failed to persist run archive");
        }

        info!(run_id = %context.run_id, %status, "workflow run finished");
        Ok(RunReport { context, status, summary, detail, error })
    }
}

/// What [`Engine::run`] hands back: the finished context, its terminal
/// status, the computed summary, and the persisted-shape detail blob.
pub struct RunReport {
    pub context: ExecutionContext,
    pub status: WorkflowStatus,
    pub summary: RunSummary,
    pub detail: Value,
    pub error: Option<String>,
}

#[async_trait::async_trait]
impl EngineHandle for Engine {
    fn services(&self) -> &Services {
        &self.inner.services
    }

    async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        mode: DispatchMode,
        input: Value,
        ancestry: &[WorkflowId],
    ) -> Result<Value, NodeError> {
        if ancestry.iter().any(|id| id == workflow_id) {
            return Err(NodeError::Fatal { message: format!("sub-workflow dispatch would cycle back to `{workflow_id}`"), details: None });
        }

        let mut child_ancestry = ancestry.to_vec();
        child_ancestry.push(workflow_id.clone());

        match mode {
            DispatchMode::Sync => {
                let report = self
                    .run_with_ancestry(workflow_id, input, TriggerInfo::default(), child_ancestry)
                    .await
                    .map_err(|err| NodeError::Fatal { message: err.to_string(), details: None })?;
                Ok(json!({
                    "status": report.status.to_string(),
                    "runId": report.context.run_id.to_string(),
                    "childOutput": report.detail["nodeOutputs"],
                }))
            }
            DispatchMode::Dispatch => {
                // Pre-validate the child exists before firing the
                // fire-and-forget task, so a typo'd workflowId surfaces to
                // the calling node instead of silently vanishing.
                self.load_workflow(workflow_id).map_err(|err| NodeError::Fatal { message: err.to_string(), details: None })?;
                // Mint the child's runId here, before spawning, so it can be
                // handed back to the caller immediately (spec §4.6).
                let run_id = RunId::v4();
                let workflow_id = workflow_id.clone();
                let engine = self.clone_handle();
                tokio::spawn(async move {
                    if let Err(err) =
                        engine.run_with_ancestry_and_id(run_id, &workflow_id, input, TriggerInfo::default(), child_ancestry).await
                    {
                        tracing::error!(%workflow_id, error = %err, "dispatched sub-workflow failed to start");
                    }
                });
                Ok(json!({ "status": "dispatched", "runId": run_id.to_string() }))
            }
        }
    }
}

/// Node-type identifiers the Trigger Dispatcher treats as event-driven
/// (spec §4.7): every other trigger subtype is evaluated on its own tick.
const EVENT_TRIGGER_TYPES: [&str; 5] =
    ["trigger.event", "trigger.pr_event", "trigger.task_assigned", "trigger.anomaly", "trigger.webhook"];

/// One fired-workflow decision from [`Engine::evaluate_event_triggers`].
#[derive(Debug, Clone)]
pub struct TriggerMatch {
    pub workflow_id: WorkflowId,
    pub triggered_by: NodeId,
    pub event_data: Value,
}

impl Engine {
    /// `evaluateTriggers(eventType, eventData)` (spec §4.7): scans every
    /// enabled workflow's event-capable trigger nodes and returns the set
    /// that fire.
    pub async fn evaluate_event_triggers(&self, event_type: &str, event_data: Value) -> Vec<TriggerMatch> {
        self.evaluate_trigger_nodes(event_type, event_data, &EVENT_TRIGGER_TYPES).await
    }

    /// Non-event-driven trigger subtypes (`manual`, `schedule`,
    /// `scheduled_once`, `task_available`, `meeting.wake_phrase`) are
    /// "evaluated on their own tick" (spec §4.7) — a caller (CLI/daemon
    /// scheduler loop) invokes this periodically instead of per-event.
    pub async fn poll_triggers(&self) -> Vec<TriggerMatch> {
        const POLL_TRIGGER_TYPES: [&str; 5] =
            ["trigger.manual", "trigger.schedule", "trigger.scheduled_once", "trigger.task_available", "meeting.wake_phrase"];
        self.evaluate_trigger_nodes("poll", Value::Null, &POLL_TRIGGER_TYPES).await
    }

    async fn evaluate_trigger_nodes(&self, event_type: &str, event_data: Value, eligible_types: &[&str]) -> Vec<TriggerMatch> {
        let mut matches = Vec::new();
        for workflow in self.inner.store.list() {
            if !workflow.enabled {
                continue;
            }
            for node in &workflow.nodes {
                if !eligible_types.contains(&node.node_type.as_str()) {
                    continue;
                }
                let Ok(handler) = self.inner.registry.get(&node.node_type) else { continue };

                let seed = json!({ "eventType": event_type, "event": event_data.clone() });
                let ctx = ExecutionContext::new(workflow.id.clone(), workflow.name.clone(), workflow.variables.clone(), seed);
                let resolved_config = ctx.resolve_config(&node.config);
                let resolved = ResolvedNode { id: &node.id, node_type: &node.node_type, config: resolved_config };

                match handler.execute(&resolved, &ctx, self).await {
                    Ok(output) => {
                        if output.get("triggered").and_then(Value::as_bool) == Some(true) {
                            matches.push(TriggerMatch { workflow_id: workflow.id.clone(), triggered_by: node.id.clone(), event_data: event_data.clone() });
                        }
                    }
                    Err(err) => {
                        tracing::debug!(workflow_id = %workflow.id, node_id = %node.id, error = %err, "trigger evaluation failed");
                    }
                }
            }
        }
        matches
    }

    /// `listNodeTypes()` (spec §4.3) grouped by category, for builder-UI
    /// style tooling consumption.
    #[must_use]
    pub fn describe_node_types(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        let mut out: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
        for node_type in self.inner.registry.list_node_types() {
            out.entry(node_type.category().to_string()).or_default().push(node_type.as_str().to_string());
        }
        for types in out.values_mut() {
            types.sort();
        }
        out
    }
}
