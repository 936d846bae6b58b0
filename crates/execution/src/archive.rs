//! Run Archive (spec §4.8): persists a bounded summary index plus one
//! full `RunDetail` JSON document per terminal run, and serves
//! `getRunHistory`/`getRunDetail` merging persisted data with live runs.

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::run::RunSummary;
use dashmap::DashMap;
use fleet_core::{RunId, WorkflowId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::warn;

pub struct RunArchive {
    dir: PathBuf,
    max_persisted_runs: usize,
    index: Mutex<VecDeque<RunSummary>>,
    running: DashMap<RunId, ExecutionContext>,
}

impl RunArchive {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_persisted_runs: usize) -> Self {
        Self {
            dir: dir.into(),
            max_persisted_runs: max_persisted_runs.clamp(20, 5000),
            index: Mutex::new(VecDeque::new()),
            running: DashMap::new(),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn detail_path(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Load the persisted index from disk, if present.
    pub fn load(&self) -> Result<(), ExecutionError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.index_path();
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)?;
        let entries: VecDeque<RunSummary> = serde_json::from_str(&raw)?;
        *self.index.lock() = entries;
        Ok(())
    }

    /// Register a context as actively running so `getRunHistory` and
    /// `getRunDetail` can synthesize it live.
    pub fn register_running(&self, context: ExecutionContext) {
        self.running.insert(context.run_id.clone(), context);
    }

    pub fn unregister_running(&self, run_id: &RunId) {
        self.running.remove(run_id);
    }

    #[must_use]
    pub fn is_running(&self, run_id: &RunId) -> bool {
        self.running.contains_key(run_id)
    }

    /// On a terminal transition: compute and append a `RunSummary` to
    /// the index (evicting from the head past `max_persisted_runs`), and
    /// write the full `RunDetail`.
    pub fn finalize(&self, summary: RunSummary, detail: Value) -> Result<(), ExecutionError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.detail_path(&summary.run_id), serde_json::to_vec_pretty(&detail)?)?;

        let mut index = self.index.lock();
        index.push_back(summary);
        while index.len() > self.max_persisted_runs {
            index.pop_front();
        }
        std::fs::write(self.index_path(), serde_json::to_vec_pretty(&*index)?)?;
        Ok(())
    }

    /// Merge active runs (computed live) with persisted summaries,
    /// dedup by `runId` preferring the active entry, filter by
    /// `workflow_id` if given, sort by `startedAt` descending, cap at
    /// `limit`.
    #[must_use]
    pub fn get_run_history(
        &self,
        workflow_id: Option<&WorkflowId>,
        limit: usize,
        stuck_threshold_ms: i64,
        total_nodes_for: impl Fn(&WorkflowId) -> usize,
    ) -> Vec<RunSummary> {
        use crate::run::TriggerInfo;
        use crate::status::WorkflowStatus;

        let mut merged: Vec<RunSummary> = Vec::new();
        let mut seen: std::collections::HashSet<RunId> = std::collections::HashSet::new();

        for entry in self.running.iter() {
            let context = entry.value();
            if workflow_id.is_some_and(|id| id != &context.workflow_id) {
                continue;
            }
            let summary = RunSummary::compute(
                context,
                WorkflowStatus::Running,
                None,
                total_nodes_for(&context.workflow_id),
                stuck_threshold_ms,
                TriggerInfo::default(),
            );
            seen.insert(summary.run_id.clone());
            merged.push(summary);
        }

        for summary in self.index.lock().iter() {
            if seen.contains(&summary.run_id) {
                continue;
            }
            if workflow_id.is_some_and(|id| id != &summary.workflow_id) {
                continue;
            }
            merged.push(summary.clone());
        }

        merged.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        merged.truncate(limit);
        merged
    }

    /// Returns the serialized detail for `run_id`, synthesizing it live
    /// if the run is still active.
    #[must_use]
    pub fn get_run_detail(&self, run_id: &RunId) -> Option<Value> {
        if let Some(context) = self.running.get(run_id) {
            return Some(context.to_json(None));
        }
        let path = self.detail_path(run_id);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).ok(),
            Err(_) => None,
        }
    }

    #[must_use]
    pub fn index_len(&self) -> usize {
        self.index.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::TriggerInfo;
    use crate::status::WorkflowStatus;
    use serde_json::json;
    use std::collections::HashMap;

    fn summary_for(context: &ExecutionContext, status: WorkflowStatus) -> RunSummary {
        RunSummary::compute(context, status, Some(chrono::Utc::now()), 1, 300_000, TriggerInfo::default())
    }

    #[test]
    fn finalize_then_load_round_trips_index() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = RunArchive::new(tmp.path(), 200);
        let context = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
        let summary = summary_for(&context, WorkflowStatus::Completed);
        archive.finalize(summary, context.to_json(Some(chrono::Utc::now()))).unwrap();

        let archive2 = RunArchive::new(tmp.path(), 200);
        archive2.load().unwrap();
        assert_eq!(archive2.index_len(), 1);
    }

    #[test]
    fn index_evicts_from_head_past_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = RunArchive::new(tmp.path(), 20); // clamp floor
        for _ in 0..25 {
            let context = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
            let summary = summary_for(&context, WorkflowStatus::Completed);
            archive.finalize(summary, context.to_json(Some(chrono::Utc::now()))).unwrap();
        }
        assert_eq!(archive.index_len(), 20);
    }

    #[test]
    fn active_run_is_preferred_over_persisted_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = RunArchive::new(tmp.path(), 200);
        let context = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
        let summary = summary_for(&context, WorkflowStatus::Completed);
        archive.finalize(summary, context.to_json(Some(chrono::Utc::now()))).unwrap();
        archive.register_running(context.clone());

        let history = archive.get_run_history(None, 10, 300_000, |_| 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, WorkflowStatus::Running);
    }

    #[test]
    fn get_run_detail_synthesizes_active_run_live() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = RunArchive::new(tmp.path(), 200);
        let context = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
        archive.register_running(context.clone());
        let detail = archive.get_run_detail(&context.run_id).unwrap();
        assert_eq!(detail["workflowName"], json!("wf"));
    }

    #[test]
    fn get_run_detail_reads_persisted_for_finished_run() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = RunArchive::new(tmp.path(), 200);
        let context = ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}));
        let summary = summary_for(&context, WorkflowStatus::Completed);
        archive.finalize(summary, context.to_json(Some(chrono::Utc::now()))).unwrap();
        let detail = archive.get_run_detail(&context.run_id).unwrap();
        assert_eq!(detail["workflowName"], json!("wf"));
    }
}
