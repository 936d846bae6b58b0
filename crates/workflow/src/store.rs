//! Workflow Store (spec §4.4): one JSON document per workflow in a
//! configured directory, with an in-memory index and atomic writes.

use crate::dag;
use crate::error::WorkflowError;
use crate::model::WorkflowDefinition;
use chrono::Utc;
use dashmap::DashMap;
use fleet_core::WorkflowId;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub struct WorkflowStore {
    dir: PathBuf,
    index: DashMap<WorkflowId, WorkflowDefinition>,
    locks: DashMap<WorkflowId, Arc<Mutex<()>>>,
}

impl WorkflowStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn path_for(&self, id: &WorkflowId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    fn lock_for(&self, id: &WorkflowId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Read every `.json` file in the configured directory, discarding
    /// malformed entries with a warning (spec §4.4: "parses, discards
    /// malformed entries with a warning").
    pub fn load(&self) -> Result<(), WorkflowError> {
        std::fs::create_dir_all(&self.dir)?;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_definition(&path) {
                Ok(def) => {
                    self.index.insert(def.id.clone(), def);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding malformed workflow definition");
                }
            }
        }
        Ok(())
    }

    fn read_definition(&self, path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
        let raw = std::fs::read_to_string(path)?;
        let def: WorkflowDefinition = serde_json::from_str(&raw)?;
        dag::validate(&def)?;
        Ok(def)
    }

    #[must_use]
    pub fn get(&self, id: &WorkflowId) -> Option<WorkflowDefinition> {
        self.index.get(id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<WorkflowDefinition> {
        self.index.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Validate, stamp metadata, increment version, and atomically write
    /// `def` to `<id>.json`. Write-write contention on the same id is
    /// serialized by a per-id mutex.
    pub fn save(&self, def: &mut WorkflowDefinition) -> Result<(), WorkflowError> {
        dag::validate(def)?;

        let lock = self.lock_for(&def.id);
        let _guard = lock.lock();

        let now = Utc::now();
        if def.metadata.created_at.is_none() {
            def.metadata.created_at = Some(now);
        }
        def.metadata.updated_at = Some(now);
        def.metadata.version += 1;

        std::fs::create_dir_all(&self.dir)?;
        let final_path = self.path_for(&def.id);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        let body = serde_json::to_vec_pretty(def)?;
        tmp.write_all(&body)?;
        tmp.flush()?;
        tmp.persist(&final_path).map_err(|e| WorkflowError::AtomicWrite(e.to_string()))?;

        self.index.insert(def.id.clone(), def.clone());
        Ok(())
    }

    /// Remove the file and the index entry.
    pub fn delete(&self, id: &WorkflowId) -> Result<(), WorkflowError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock();

        let path = self.path_for(id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.index.remove(id).ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
        Ok(())
    }

    /// Mint a new id regardless of `payload.id` (to avoid collisions),
    /// validate, and save.
    pub fn import(&self, mut payload: WorkflowDefinition) -> Result<WorkflowId, WorkflowError> {
        payload.id = WorkflowId::generate();
        payload.metadata.version = 0;
        payload.metadata.created_at = None;
        self.save(&mut payload)?;
        Ok(payload.id)
    }

    /// Serialize the indexed form of a workflow.
    pub fn export(&self, id: &WorkflowId) -> Result<WorkflowDefinition, WorkflowError> {
        self.get(id).ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{WorkflowEdge, WorkflowMetadata, WorkflowNode};
    use fleet_core::{EdgeId, NodeId, NodeTypeId};
    use serde_json::json;

    fn sample(id: WorkflowId) -> WorkflowDefinition {
        WorkflowDefinition {
            id,
            name: "sample".to_string(),
            description: None,
            category: None,
            enabled: true,
            trigger: "manual".to_string(),
            nodes: vec![WorkflowNode {
                id: NodeId::new("n1").unwrap(),
                node_type: NodeTypeId::new("action.delay").unwrap(),
                label: None,
                position: None,
                config: json!({}),
            }],
            edges: vec![],
            variables: Default::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let id = WorkflowId::generate();
        let mut def = sample(id.clone());
        store.save(&mut def).unwrap();
        assert_eq!(def.metadata.version, 1);

        let store2 = WorkflowStore::new(tmp.path());
        store2.load().unwrap();
        let loaded = store2.get(&id).unwrap();
        assert_eq!(loaded.name, "sample");
    }

    #[test]
    fn save_increments_version_on_each_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let mut def = sample(WorkflowId::generate());
        store.save(&mut def).unwrap();
        store.save(&mut def).unwrap();
        assert_eq!(def.metadata.version, 2);
    }

    #[test]
    fn malformed_file_is_discarded_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{not json").unwrap();
        let store = WorkflowStore::new(tmp.path());
        store.load().unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn import_mints_new_id_ignoring_payload_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let payload = sample(WorkflowId::new("template-untrusted").unwrap());
        let minted = store.import(payload).unwrap();
        assert_ne!(minted.as_str(), "template-untrusted");
        assert!(store.get(&minted).is_some());
    }

    #[test]
    fn delete_removes_file_and_index_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let id = WorkflowId::generate();
        let mut def = sample(id.clone());
        store.save(&mut def).unwrap();
        store.delete(&id).unwrap();
        assert!(store.get(&id).is_none());
        assert!(!tmp.path().join(format!("{}.json", id.as_str())).exists());
    }

    #[test]
    fn delete_missing_workflow_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let err = store.delete(&WorkflowId::generate()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[test]
    fn export_returns_indexed_form() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let id = WorkflowId::generate();
        let mut def = sample(id.clone());
        store.save(&mut def).unwrap();
        let exported = store.export(&id).unwrap();
        assert_eq!(exported.id, id);
    }

    #[test]
    fn save_rejects_invalid_dag() {
        let tmp = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(tmp.path());
        let mut def = sample(WorkflowId::generate());
        def.edges.push(WorkflowEdge {
            id: EdgeId::new("bad").unwrap(),
            source: NodeId::new("n1").unwrap(),
            target: NodeId::new("ghost").unwrap(),
            source_port: "default".to_string(),
            condition: None,
        });
        assert!(store.save(&mut def).is_err());
    }
}
