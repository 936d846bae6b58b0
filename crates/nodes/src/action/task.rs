//! Kanban-, claims-, and slot-facing `action.*` handlers (spec §6).

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};

fn config_str<'a>(config: &'a Value, key: &str, node_type: &str) -> Result<&'a str, NodeError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::Validation(format!("{node_type} requires a string `{key}` config field")))
}

/// `action.create_task` — creates a kanban task under `config.projectId`.
pub struct CreateTaskAction;

#[async_trait]
impl NodeHandler for CreateTaskAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let project_id = config_str(&node.config, "projectId", "action.create_task")?;
        let task = node.config.get("task").cloned().unwrap_or(json!({}));
        let created = engine.services().kanban()?.create_task(project_id, task).await?;
        Ok(json!({ "task": created }))
    }

    fn describe(&self) -> String {
        "creates a kanban task".into()
    }
}

/// `action.update_task_status` — patches `config.status` (and any other
/// keys under `config.patch`) onto `config.taskId`.
pub struct UpdateTaskStatusAction;

#[async_trait]
impl NodeHandler for UpdateTaskStatusAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let task_id = config_str(&node.config, "taskId", "action.update_task_status")?;
        let status = config_str(&node.config, "status", "action.update_task_status")?;

        let mut patch = node.config.get("patch").cloned().unwrap_or(json!({}));
        if let Value::Object(map) = &mut patch {
            map.insert("status".to_string(), Value::String(status.to_string()));
        } else {
            patch = json!({ "status": status });
        }

        let task = engine.services().kanban()?.update_task(task_id, patch).await?;
        Ok(json!({ "task": task }))
    }

    fn describe(&self) -> String {
        "updates a kanban task's status".into()
    }
}

/// `action.materialize_planner_tasks` — takes `config.tasks` (an array
/// produced upstream by `action.run_planner`) and creates one kanban task
/// per entry under `config.projectId`.
pub struct MaterializePlannerTasksAction;

#[async_trait]
impl NodeHandler for MaterializePlannerTasksAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let project_id = config_str(&node.config, "projectId", "action.materialize_planner_tasks")?;
        let tasks = node
            .config
            .get("tasks")
            .and_then(Value::as_array)
            .ok_or_else(|| NodeError::Validation("action.materialize_planner_tasks requires an array `tasks` config field".into()))?;

        let kanban = engine.services().kanban()?;
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            created.push(kanban.create_task(project_id, task.clone()).await?);
        }

        Ok(json!({ "created": created, "count": created.len() }))
    }

    fn describe(&self) -> String {
        "creates a kanban task for each planner-proposed item".into()
    }
}

/// `action.claim_task` — claims `config.taskId` on behalf of `config.agentId`.
pub struct ClaimTaskAction;

#[async_trait]
impl NodeHandler for ClaimTaskAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let task_id = config_str(&node.config, "taskId", "action.claim_task")?;
        let agent_id = config_str(&node.config, "agentId", "action.claim_task")?;
        let token = engine.services().claims()?.claim(task_id, agent_id).await?;
        Ok(json!({ "claimed": true, "token": token }))
    }

    fn describe(&self) -> String {
        "claims a task for an agent".into()
    }
}

/// `action.release_claim` — releases the claim on `config.taskId`.
pub struct ReleaseClaimAction;

#[async_trait]
impl NodeHandler for ReleaseClaimAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let task_id = config_str(&node.config, "taskId", "action.release_claim")?;
        engine.services().claims()?.release(task_id).await?;
        Ok(json!({ "released": true }))
    }

    fn describe(&self) -> String {
        "releases a task claim".into()
    }
}

/// `action.allocate_slot` — claims a concurrency slot from the shared
/// [`crate::slots::SlotRegistry`] also checked by `condition.slot_available`.
pub struct AllocateSlotAction {
    slots: crate::slots::SlotRegistry,
}

impl AllocateSlotAction {
    #[must_use]
    pub fn new(slots: crate::slots::SlotRegistry) -> Self {
        Self { slots }
    }
}

#[async_trait]
impl NodeHandler for AllocateSlotAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let resource = node.config.get("resource").and_then(Value::as_str).unwrap_or("default");
        let capacity = node.config.get("capacity").and_then(Value::as_u64).unwrap_or(1) as usize;
        let allocated = self.slots.allocate(resource, capacity);
        Ok(json!({ "allocated": allocated, "resource": resource }))
    }

    fn describe(&self) -> String {
        "claims a concurrency slot for a named resource".into()
    }
}

/// `action.release_slot` — releases a previously allocated slot.
pub struct ReleaseSlotAction {
    slots: crate::slots::SlotRegistry,
}

impl ReleaseSlotAction {
    #[must_use]
    pub fn new(slots: crate::slots::SlotRegistry) -> Self {
        Self { slots }
    }
}

#[async_trait]
impl NodeHandler for ReleaseSlotAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, _engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let resource = node.config.get("resource").and_then(Value::as_str).unwrap_or("default");
        self.slots.release(resource);
        Ok(json!({ "released": true, "resource": resource }))
    }

    fn describe(&self) -> String {
        "releases a concurrency slot for a named resource".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_action::{ClaimsService, KanbanService, Services};
    use fleet_core::{NodeId, NodeTypeId, WorkflowId};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeKanban;
    #[async_trait]
    impl KanbanService for FakeKanban {
        async fn list_tasks(&self, _filter: Value) -> Result<Vec<Value>, NodeError> {
            Ok(vec![])
        }
        async fn get_task(&self, id: &str) -> Result<Value, NodeError> {
            Ok(json!({ "id": id }))
        }
        async fn create_task(&self, project_id: &str, task: Value) -> Result<Value, NodeError> {
            Ok(json!({ "projectId": project_id, "task": task }))
        }
        async fn update_task(&self, id: &str, patch: Value) -> Result<Value, NodeError> {
            Ok(json!({ "id": id, "patch": patch }))
        }
        async fn archive_task(&self, _id: &str) -> Result<(), NodeError> {
            Ok(())
        }
    }

    struct FakeClaims;
    #[async_trait]
    impl ClaimsService for FakeClaims {
        async fn claim(&self, _task_id: &str, _agent_id: &str) -> Result<String, NodeError> {
            Ok("tok-1".into())
        }
        async fn release(&self, _task_id: &str) -> Result<(), NodeError> {
            Ok(())
        }
        async fn is_claimed(&self, _task_id: &str) -> Result<bool, NodeError> {
            Ok(true)
        }
    }

    struct StubEngine {
        services: Services,
    }
    #[async_trait]
    impl EngineHandle for StubEngine {
        fn services(&self) -> &Services {
            &self.services
        }
        async fn execute_workflow(&self, _w: &WorkflowId, _m: fleet_action::DispatchMode, _i: Value, _a: &[WorkflowId]) -> Result<Value, NodeError> {
            unimplemented!()
        }
    }

    fn engine() -> StubEngine {
        StubEngine {
            services: Services { kanban_port: Some(Arc::new(FakeKanban)), claims_port: Some(Arc::new(FakeClaims)), ..Services::default() },
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}))
    }

    fn resolved<'a>(id: &'a NodeId, ty: &'a NodeTypeId, config: Value) -> ResolvedNode<'a> {
        ResolvedNode { id, node_type: ty, config }
    }

    #[tokio::test]
    async fn create_task_forwards_to_kanban() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("t1").unwrap();
        let ty = NodeTypeId::new("action.create_task").unwrap();
        let node = resolved(&id, &ty, json!({ "projectId": "p1", "task": {"title": "fix"} }));
        let out = CreateTaskAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["task"]["projectId"], json!("p1"));
    }

    #[tokio::test]
    async fn update_task_status_merges_status_into_patch() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("t1").unwrap();
        let ty = NodeTypeId::new("action.update_task_status").unwrap();
        let node = resolved(&id, &ty, json!({ "taskId": "t1", "status": "done", "patch": {"note": "x"} }));
        let out = UpdateTaskStatusAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["task"]["patch"]["status"], json!("done"));
        assert_eq!(out["task"]["patch"]["note"], json!("x"));
    }

    #[tokio::test]
    async fn materialize_planner_tasks_creates_one_per_item() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("m1").unwrap();
        let ty = NodeTypeId::new("action.materialize_planner_tasks").unwrap();
        let node = resolved(&id, &ty, json!({ "projectId": "p1", "tasks": [{"title": "a"}, {"title": "b"}] }));
        let out = MaterializePlannerTasksAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["count"], json!(2));
    }

    #[tokio::test]
    async fn claim_then_release() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("c1").unwrap();
        let ty = NodeTypeId::new("action.claim_task").unwrap();
        let node = resolved(&id, &ty, json!({ "taskId": "t1", "agentId": "a1" }));
        let out = ClaimTaskAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["token"], json!("tok-1"));

        let id2 = NodeId::new("c2").unwrap();
        let ty2 = NodeTypeId::new("action.release_claim").unwrap();
        let node2 = resolved(&id2, &ty2, json!({ "taskId": "t1" }));
        let out2 = ReleaseClaimAction.execute(&node2, &context, &eng).await.unwrap();
        assert_eq!(out2["released"], json!(true));
    }

    #[tokio::test]
    async fn allocate_slot_respects_shared_capacity() {
        let context = ctx();
        let eng = engine();
        let slots = crate::slots::SlotRegistry::default();
        let allocate = AllocateSlotAction::new(slots.clone());
        let release = ReleaseSlotAction::new(slots);

        let id = NodeId::new("s1").unwrap();
        let ty = NodeTypeId::new("action.allocate_slot").unwrap();
        let node = resolved(&id, &ty, json!({ "resource": "worktrees", "capacity": 1 }));
        let first = allocate.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(first["allocated"], json!(true));
        let second = allocate.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(second["allocated"], json!(false));

        let id2 = NodeId::new("s2").unwrap();
        let ty2 = NodeTypeId::new("action.release_slot").unwrap();
        let rel_node = resolved(&id2, &ty2, json!({ "resource": "worktrees" }));
        release.execute(&rel_node, &context, &eng).await.unwrap();
        let third = allocate.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(third["allocated"], json!(true));
    }
}
