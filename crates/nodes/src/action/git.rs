//! Git- and worktree-facing `action.*` handlers (spec §6).

use async_trait::async_trait;
use fleet_action::{EngineHandle, NodeError, NodeHandler, ResolvedNode};
use fleet_execution::ExecutionContext;
use serde_json::{json, Value};

/// Branches the engine refuses to push to directly (spec §6 "Action.push_branch
/// safety contract"). `origin/<protected>` forms are covered by stripping a
/// leading `origin/` before the membership check.
const PROTECTED_BRANCHES: [&str; 4] = ["main", "master", "develop", "production"];

fn is_protected(branch: &str) -> bool {
    let stripped = branch.strip_prefix("origin/").unwrap_or(branch);
    PROTECTED_BRANCHES.contains(&stripped)
}

fn config_str<'a>(config: &'a Value, key: &str, node_type: &str) -> Result<&'a str, NodeError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::Validation(format!("{node_type} requires a string `{key}` config field")))
}

/// `action.push_branch` — refuses any push targeting a protected branch
/// without invoking git at all (testable property I8).
pub struct PushBranchAction;

#[async_trait]
impl NodeHandler for PushBranchAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let branch = config_str(&node.config, "branch", "action.push_branch")?;

        if is_protected(branch) {
            return Ok(json!({
                "success": false,
                "pushed": false,
                "error": format!("Protected branch `{branch}` may not be pushed to directly"),
            }));
        }

        engine.services().git()?.push(branch).await?;
        Ok(json!({ "success": true, "pushed": true, "branch": branch }))
    }

    fn describe(&self) -> String {
        "pushes a branch, refusing protected targets without touching git".into()
    }
}

/// `action.detect_new_commits` — compares the worktree's current branch
/// head against `config.sinceBranch`/`config.sinceCommit` by checking
/// whether it has pending changes relative to that reference. The `git`
/// port exposes no direct "commits since" query, so this reports the
/// coarser `hasPendingChanges` signal the port does provide.
pub struct DetectNewCommitsAction;

#[async_trait]
impl NodeHandler for DetectNewCommitsAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let path = config_str(&node.config, "worktreePath", "action.detect_new_commits")?;
        let git = engine.services().git()?;
        let branch = git.current_branch(path).await?;
        let has_new = git.has_pending_changes(path).await?;
        Ok(json!({ "hasNewCommits": has_new, "branch": branch }))
    }

    fn describe(&self) -> String {
        "reports whether a worktree has commits not yet pushed".into()
    }
}

/// `action.git_operations` — a small dispatcher over `config.operation`
/// (`checkout` | `createBranch` | `push` | `currentBranch` |
/// `hasPendingChanges`), so one node type can cover the simple git port
/// calls a workflow author would otherwise need five separate node types
/// for.
pub struct GitOperationsAction;

#[async_trait]
impl NodeHandler for GitOperationsAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let operation = config_str(&node.config, "operation", "action.git_operations")?;
        let git = engine.services().git()?;

        match operation {
            "checkout" => {
                let branch = config_str(&node.config, "branch", "action.git_operations(checkout)")?;
                git.checkout(branch).await?;
                Ok(json!({ "operation": operation, "branch": branch }))
            }
            "createBranch" => {
                let name = config_str(&node.config, "name", "action.git_operations(createBranch)")?;
                git.create_branch(name).await?;
                Ok(json!({ "operation": operation, "name": name }))
            }
            "push" => {
                let branch = config_str(&node.config, "branch", "action.git_operations(push)")?;
                if is_protected(branch) {
                    return Ok(json!({ "operation": operation, "success": false, "error": format!("Protected branch `{branch}` may not be pushed to directly") }));
                }
                git.push(branch).await?;
                Ok(json!({ "operation": operation, "success": true, "branch": branch }))
            }
            "currentBranch" => {
                let path = config_str(&node.config, "path", "action.git_operations(currentBranch)")?;
                let branch = git.current_branch(path).await?;
                Ok(json!({ "operation": operation, "branch": branch }))
            }
            "hasPendingChanges" => {
                let path = config_str(&node.config, "path", "action.git_operations(hasPendingChanges)")?;
                let has_changes = git.has_pending_changes(path).await?;
                Ok(json!({ "operation": operation, "hasPendingChanges": has_changes }))
            }
            other => Err(NodeError::Validation(format!("action.git_operations: unknown operation `{other}`"))),
        }
    }

    fn describe(&self) -> String {
        "dispatches a single git-port call named by its `operation` config field".into()
    }
}

/// `action.acquire_worktree` — checks out an isolated worktree for
/// `config.branch`.
pub struct AcquireWorktreeAction;

#[async_trait]
impl NodeHandler for AcquireWorktreeAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let branch = config_str(&node.config, "branch", "action.acquire_worktree")?;
        let worktree = engine.services().worktree()?.acquire(branch).await?;
        Ok(json!({ "path": worktree.path, "branch": worktree.branch }))
    }

    fn describe(&self) -> String {
        "acquires an isolated git worktree for a branch".into()
    }
}

/// `action.release_worktree` — releases `config.worktreePath` back to
/// the pool.
pub struct ReleaseWorktreeAction;

#[async_trait]
impl NodeHandler for ReleaseWorktreeAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let path = config_str(&node.config, "worktreePath", "action.release_worktree")?;
        engine.services().worktree()?.release(path).await?;
        Ok(json!({ "released": true, "path": path }))
    }

    fn describe(&self) -> String {
        "releases a worktree back to the pool".into()
    }
}

/// `action.create_pr` — no dedicated PR-creation port exists (spec §6
/// lists no such method); this composes the `git` push with a kanban
/// status update recording the PR intent, which is the closest the
/// documented service surface gets to "open a pull request" without the
/// engine itself speaking to a forge API.
pub struct CreatePrAction;

#[async_trait]
impl NodeHandler for CreatePrAction {
    async fn execute(&self, node: &ResolvedNode<'_>, _ctx: &ExecutionContext, engine: &dyn EngineHandle) -> Result<Value, NodeError> {
        let branch = config_str(&node.config, "branch", "action.create_pr")?;
        let task_id = config_str(&node.config, "taskId", "action.create_pr")?;
        let title = node.config.get("title").and_then(Value::as_str).unwrap_or(branch);

        if is_protected(branch) {
            return Ok(json!({ "success": false, "pushed": false, "error": format!("Protected branch `{branch}` may not be pushed to directly") }));
        }

        engine.services().git()?.push(branch).await?;
        let patch = json!({ "status": "in_review", "branch": branch, "prTitle": title });
        let task = engine.services().kanban()?.update_task(task_id, patch).await?;

        Ok(json!({ "success": true, "branch": branch, "task": task }))
    }

    fn describe(&self) -> String {
        "pushes a branch and marks its task as in review, standing in for PR creation".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_action::{AgentPoolService, AgentRunOutcome, ClaimsService, GitService, KanbanService, Services, TelegramService, Worktree, WorktreeService};
    use fleet_core::{NodeId, NodeTypeId, WorkflowId};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeGit;
    #[async_trait]
    impl GitService for FakeGit {
        async fn current_branch(&self, _path: &str) -> Result<String, NodeError> {
            Ok("feature/x".into())
        }
        async fn has_pending_changes(&self, _path: &str) -> Result<bool, NodeError> {
            Ok(true)
        }
        async fn push(&self, _branch: &str) -> Result<(), NodeError> {
            Ok(())
        }
        async fn checkout(&self, _branch: &str) -> Result<(), NodeError> {
            Ok(())
        }
        async fn create_branch(&self, _name: &str) -> Result<(), NodeError> {
            Ok(())
        }
    }

    struct FakeWorktree;
    #[async_trait]
    impl WorktreeService for FakeWorktree {
        async fn acquire(&self, branch: &str) -> Result<Worktree, NodeError> {
            Ok(Worktree { path: format!("/tmp/wt-{branch}"), branch: branch.to_string() })
        }
        async fn release(&self, _path: &str) -> Result<(), NodeError> {
            Ok(())
        }
        async fn list(&self) -> Result<Vec<Worktree>, NodeError> {
            Ok(vec![])
        }
    }

    struct FakeKanban;
    #[async_trait]
    impl KanbanService for FakeKanban {
        async fn list_tasks(&self, _filter: Value) -> Result<Vec<Value>, NodeError> {
            Ok(vec![])
        }
        async fn get_task(&self, id: &str) -> Result<Value, NodeError> {
            Ok(json!({ "id": id }))
        }
        async fn create_task(&self, _project_id: &str, task: Value) -> Result<Value, NodeError> {
            Ok(task)
        }
        async fn update_task(&self, id: &str, patch: Value) -> Result<Value, NodeError> {
            Ok(json!({ "id": id, "patch": patch }))
        }
        async fn archive_task(&self, _id: &str) -> Result<(), NodeError> {
            Ok(())
        }
    }

    struct UnusedAgentPool;
    #[async_trait]
    impl AgentPoolService for UnusedAgentPool {
        async fn launch_ephemeral_thread(&self, _p: &str, _c: &str, _t: u64) -> Result<AgentRunOutcome, NodeError> {
            unimplemented!()
        }
        async fn exec_with_retry(&self, _p: &str, _c: &str, _t: u64, _r: u32) -> Result<AgentRunOutcome, NodeError> {
            unimplemented!()
        }
        async fn continue_session(&self, _s: &str, _p: &str) -> Result<AgentRunOutcome, NodeError> {
            unimplemented!()
        }
    }

    struct UnusedClaims;
    #[async_trait]
    impl ClaimsService for UnusedClaims {
        async fn claim(&self, _t: &str, _a: &str) -> Result<String, NodeError> {
            unimplemented!()
        }
        async fn release(&self, _t: &str) -> Result<(), NodeError> {
            unimplemented!()
        }
        async fn is_claimed(&self, _t: &str) -> Result<bool, NodeError> {
            unimplemented!()
        }
    }

    struct UnusedTelegram;
    #[async_trait]
    impl TelegramService for UnusedTelegram {
        async fn send(&self, _m: &str) -> Result<(), NodeError> {
            unimplemented!()
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
            services: Services {
                kanban_port: Some(Arc::new(FakeKanban)),
                git_port: Some(Arc::new(FakeGit)),
                worktree_port: Some(Arc::new(FakeWorktree)),
                agent_pool_port: Some(Arc::new(UnusedAgentPool)),
                claims_port: Some(Arc::new(UnusedClaims)),
                telegram_port: Some(Arc::new(UnusedTelegram)),
                config_port: None,
            },
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(WorkflowId::generate(), "wf", HashMap::new(), json!({}))
    }

    fn resolved<'a>(id: &'a NodeId, ty: &'a NodeTypeId, config: Value) -> ResolvedNode<'a> {
        ResolvedNode { id, node_type: ty, config }
    }

    #[tokio::test]
    async fn push_branch_refuses_every_protected_name() {
        let context = ctx();
        let eng = engine();
        for branch in ["main", "master", "develop", "production", "origin/main", "origin/master"] {
            let id = NodeId::new("p1").unwrap();
            let ty = NodeTypeId::new("action.push_branch").unwrap();
            let node = resolved(&id, &ty, json!({ "branch": branch }));
            let out = PushBranchAction.execute(&node, &context, &eng).await.unwrap();
            assert_eq!(out["success"], json!(false), "branch {branch} should be refused");
            assert_eq!(out["pushed"], json!(false));
            assert!(out["error"].as_str().unwrap().contains("Protected branch"));
        }
    }

    #[tokio::test]
    async fn push_branch_allows_feature_branches() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("p1").unwrap();
        let ty = NodeTypeId::new("action.push_branch").unwrap();
        let node = resolved(&id, &ty, json!({ "branch": "feature/x" }));
        let out = PushBranchAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["success"], json!(true));
    }

    #[tokio::test]
    async fn git_operations_dispatches_checkout() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("g1").unwrap();
        let ty = NodeTypeId::new("action.git_operations").unwrap();
        let node = resolved(&id, &ty, json!({ "operation": "checkout", "branch": "feature/x" }));
        let out = GitOperationsAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["branch"], json!("feature/x"));
    }

    #[tokio::test]
    async fn git_operations_rejects_unknown_operation() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("g1").unwrap();
        let ty = NodeTypeId::new("action.git_operations").unwrap();
        let node = resolved(&id, &ty, json!({ "operation": "teleport" }));
        assert!(GitOperationsAction.execute(&node, &context, &eng).await.is_err());
    }

    #[tokio::test]
    async fn acquire_then_release_worktree() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("w1").unwrap();
        let ty = NodeTypeId::new("action.acquire_worktree").unwrap();
        let node = resolved(&id, &ty, json!({ "branch": "feature/x" }));
        let out = AcquireWorktreeAction.execute(&node, &context, &eng).await.unwrap();
        let path = out["path"].as_str().unwrap().to_string();

        let id2 = NodeId::new("w2").unwrap();
        let ty2 = NodeTypeId::new("action.release_worktree").unwrap();
        let node2 = resolved(&id2, &ty2, json!({ "worktreePath": path }));
        let out2 = ReleaseWorktreeAction.execute(&node2, &context, &eng).await.unwrap();
        assert_eq!(out2["released"], json!(true));
    }

    #[tokio::test]
    async fn create_pr_refuses_protected_target() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("c1").unwrap();
        let ty = NodeTypeId::new("action.create_pr").unwrap();
        let node = resolved(&id, &ty, json!({ "branch": "main", "taskId": "t1" }));
        let out = CreatePrAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["success"], json!(false));
    }

    #[tokio::test]
    async fn create_pr_pushes_and_updates_task() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("c1").unwrap();
        let ty = NodeTypeId::new("action.create_pr").unwrap();
        let node = resolved(&id, &ty, json!({ "branch": "feature/x", "taskId": "t1", "title": "Do the thing" }));
        let out = CreatePrAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["task"]["patch"]["status"], json!("in_review"));
    }

    #[tokio::test]
    async fn detect_new_commits_reports_pending_state() {
        let context = ctx();
        let eng = engine();
        let id = NodeId::new("d1").unwrap();
        let ty = NodeTypeId::new("action.detect_new_commits").unwrap();
        let node = resolved(&id, &ty, json!({ "worktreePath": "/tmp/x" }));
        let out = DetectNewCommitsAction.execute(&node, &context, &eng).await.unwrap();
        assert_eq!(out["hasNewCommits"], json!(true));
        assert_eq!(out["branch"], json!("feature/x"));
    }
}
