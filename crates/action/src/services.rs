//! Service port traits (spec §6): the external collaborators (kanban,
//! git, worktree manager, agent SDK pool, claims, Telegram, config) this
//! workspace treats as opaque capability objects. Concrete adapters are
//! out of scope — callers wire in their own implementation.

use crate::error::NodeError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait KanbanService: Send + Sync {
    async fn list_tasks(&self, filter: Value) -> Result<Vec<Value>, NodeError>;
    async fn get_task(&self, id: &str) -> Result<Value, NodeError>;
    async fn create_task(&self, project_id: &str, task: Value) -> Result<Value, NodeError>;
    async fn update_task(&self, id: &str, patch: Value) -> Result<Value, NodeError>;
    async fn archive_task(&self, id: &str) -> Result<(), NodeError>;
}

#[async_trait]
pub trait GitService: Send + Sync {
    async fn current_branch(&self, path: &str) -> Result<String, NodeError>;
    async fn has_pending_changes(&self, path: &str) -> Result<bool, NodeError>;
    async fn push(&self, branch: &str) -> Result<(), NodeError>;
    async fn checkout(&self, branch: &str) -> Result<(), NodeError>;
    async fn create_branch(&self, name: &str) -> Result<(), NodeError>;
}

#[derive(Debug, Clone)]
pub struct Worktree {
    pub path: String,
    pub branch: String,
}

#[async_trait]
pub trait WorktreeService: Send + Sync {
    async fn acquire(&self, branch: &str) -> Result<Worktree, NodeError>;
    async fn release(&self, path: &str) -> Result<(), NodeError>;
    async fn list(&self) -> Result<Vec<Worktree>, NodeError>;
}

#[derive(Debug, Clone)]
pub struct AgentRunOutcome {
    pub success: bool,
    pub output: String,
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait AgentPoolService: Send + Sync {
    async fn launch_ephemeral_thread(&self, prompt: &str, cwd: &str, timeout_ms: u64) -> Result<AgentRunOutcome, NodeError>;
    async fn exec_with_retry(&self, prompt: &str, cwd: &str, timeout_ms: u64, max_retries: u32) -> Result<AgentRunOutcome, NodeError>;
    async fn continue_session(&self, session_id: &str, prompt: &str) -> Result<AgentRunOutcome, NodeError>;
}

#[async_trait]
pub trait ClaimsService: Send + Sync {
    async fn claim(&self, task_id: &str, agent_id: &str) -> Result<String, NodeError>;
    async fn release(&self, task_id: &str) -> Result<(), NodeError>;
    async fn is_claimed(&self, task_id: &str) -> Result<bool, NodeError>;
}

#[async_trait]
pub trait TelegramService: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NodeError>;
}

pub trait ConfigService: Send + Sync {
    fn get(&self, key: &str, fallback: Option<Value>) -> Value;
}

/// The bundle of service ports handed to node handlers through
/// [`crate::node::EngineHandle::services`]. Each port is optional — a
/// node that needs one but finds it unconfigured fails with
/// [`NodeError::ServiceUnavailable`], a fatal (non-retryable) error.
#[derive(Clone, Default)]
pub struct Services {
    pub kanban_port: Option<Arc<dyn KanbanService>>,
    pub git_port: Option<Arc<dyn GitService>>,
    pub worktree_port: Option<Arc<dyn WorktreeService>>,
    pub agent_pool_port: Option<Arc<dyn AgentPoolService>>,
    pub claims_port: Option<Arc<dyn ClaimsService>>,
    pub telegram_port: Option<Arc<dyn TelegramService>>,
    pub config_port: Option<Arc<dyn ConfigService>>,
}

macro_rules! port_accessor {
    ($method:ident, $field:ident, $trait:ty, $name:literal) => {
        pub fn $method(&self) -> Result<&Arc<$trait>, NodeError> {
            self.$field.as_ref().ok_or(NodeError::ServiceUnavailable($name))
        }
    };
}

impl Services {
    port_accessor!(kanban, kanban_port, dyn KanbanService, "kanban");
    port_accessor!(git, git_port, dyn GitService, "git");
    port_accessor!(worktree, worktree_port, dyn WorktreeService, "worktree");
    port_accessor!(agent_pool, agent_pool_port, dyn AgentPoolService, "agentPool");
    port_accessor!(claims, claims_port, dyn ClaimsService, "claims");
    port_accessor!(telegram, telegram_port, dyn TelegramService, "telegram");
    port_accessor!(config, config_port, dyn ConfigService, "config");
}
