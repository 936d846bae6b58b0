//! # Fleet Core
//!
//! Shared identifiers used throughout the Fleet workflow engine: the random
//! per-run [`RunId`], and the user-authored [`WorkflowId`], [`NodeId`],
//! [`EdgeId`], and [`NodeTypeId`] string identifiers that appear in
//! workflow definitions.
//!
//! No other crate in this workspace should define its own id newtype —
//! route everything through here so the scheduler, store, and archive all
//! agree on what identifies what.

mod id;
mod keys;

pub use id::{RunId, UuidParseError};
pub use keys::{EdgeId, KeyParseError, NodeId, NodeTypeId, WorkflowId};

/// Result type alias used by crates that don't need their own error enum.
pub type Result<T> = std::result::Result<T, KeyParseError>;
