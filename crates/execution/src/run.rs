//! `RunSummary` — the persisted index entry per run (spec §3).

use crate::context::ExecutionContext;
use crate::status::{NodeStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use fleet_core::{RunId, WorkflowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct NodeCounts {
    pub node: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub active: usize,
}

impl NodeCounts {
    #[must_use]
    pub fn from_statuses(total_nodes: usize, statuses: &std::collections::HashMap<fleet_core::NodeId, NodeStatus>) -> Self {
        let mut counts = Self { node: total_nodes, ..Self::default() };
        for status in statuses.values() {
            match status {
                NodeStatus::Completed => counts.completed += 1,
                NodeStatus::Failed => counts.failed += 1,
                NodeStatus::Skipped => counts.skipped += 1,
                NodeStatus::Running | NodeStatus::Waiting => counts.active += 1,
                NodeStatus::Pending => {}
            }
        }
        counts
    }
}

/// Who/what triggered a run, carried through to the persisted summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub trigger_event: Option<String>,
    pub trigger_source: Option<String>,
    pub triggered_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: WorkflowStatus,
    pub counts: NodeCounts,
    pub error_count: usize,
    pub log_count: usize,
    pub last_log_at: Option<DateTime<Utc>>,
    pub last_progress_at: Option<DateTime<Utc>>,
    pub is_stuck: bool,
    pub stuck_ms: i64,
    pub stuck_threshold_ms: i64,
    #[serde(flatten)]
    pub trigger: TriggerInfo,
}

impl RunSummary {
    /// Compute a summary for `context`. `ended_at` is `None` while the
    /// run is still live. Stuck detection only applies to `Running`
    /// summaries (spec §4.8: "Non-running runs always report
    /// `isStuck=false, stuckMs=0`").
    #[must_use]
    pub fn compute(
        context: &ExecutionContext,
        status: WorkflowStatus,
        ended_at: Option<DateTime<Utc>>,
        total_nodes: usize,
        stuck_threshold_ms: i64,
        trigger: TriggerInfo,
    ) -> Self {
        let last_log_at = context.last_log_at();
        let last_progress_at = context.last_progress_at();
        let duration_ms = ended_at.map(|end| (end - context.started_at).num_milliseconds());

        let (is_stuck, stuck_ms) = if status == WorkflowStatus::Running {
            let reference = [last_log_at, last_progress_at, Some(context.started_at)]
                .into_iter()
                .flatten()
                .max()
                .unwrap_or(context.started_at);
            let stuck_ms = (Utc::now() - reference).num_milliseconds().max(0);
            (stuck_ms >= stuck_threshold_ms, stuck_ms)
        } else {
            (false, 0)
        };

        Self {
            run_id: context.run_id.clone(),
            workflow_id: context.workflow_id.clone(),
            workflow_name: context.workflow_name.clone(),
            started_at: context.started_at,
            ended_at,
            duration_ms,
            status,
            counts: NodeCounts::from_statuses(total_nodes, &context.node_statuses()),
            error_count: context.error_count(),
            log_count: context.log_count(),
            last_log_at,
            last_progress_at,
            is_stuck,
            stuck_ms,
            stuck_threshold_ms,
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn sample_context() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}))
    }

    #[test]
    fn non_running_status_is_never_stuck() {
        let context = sample_context();
        let summary = RunSummary::compute(&context, WorkflowStatus::Completed, Some(Utc::now()), 3, 300_000, TriggerInfo::default());
        assert!(!summary.is_stuck);
        assert_eq!(summary.stuck_ms, 0);
    }

    #[test]
    fn counts_reflect_node_statuses() {
        let context = sample_context();
        context.set_node_status(fleet_core::NodeId::new("a").unwrap(), NodeStatus::Completed);
        context.set_node_status(fleet_core::NodeId::new("b").unwrap(), NodeStatus::Failed);
        let summary = RunSummary::compute(&context, WorkflowStatus::Failed, Some(Utc::now()), 2, 300_000, TriggerInfo::default());
        assert_eq!(summary.counts.completed, 1);
        assert_eq!(summary.counts.failed, 1);
        assert_eq!(summary.counts.node, 2);
    }
}
