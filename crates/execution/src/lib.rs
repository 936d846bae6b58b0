//! Execution Context (spec §4.5), `NodeStatus`/`WorkflowStatus` (spec §3),
//! and the Run Archive (spec §4.8).

pub mod archive;
pub mod context;
pub mod error;
pub mod run;
pub mod status;

pub use archive::RunArchive;
pub use context::{deep_merge, ErrorEntry, ExecutionContext, LogEntry, StatusEvent};
pub use error::ExecutionError;
pub use run::{NodeCounts, RunSummary, TriggerInfo};
pub use status::{LogLevel, NodeStatus, WorkflowStatus};
