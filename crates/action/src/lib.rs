//! Node Registry, node handler trait, and external Service port traits
//! (spec §4.3, §6).

mod error;
mod node;
mod registry;
mod services;

pub use error::NodeError;
pub use node::{DispatchMode, EngineHandle, NodeHandler, ResolvedNode};
pub use registry::NodeRegistry;
pub use services::{
    AgentPoolService, AgentRunOutcome, ClaimsService, ConfigService, GitService, KanbanService, Services, TelegramService, Worktree, WorktreeService,
};
