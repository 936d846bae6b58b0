//! Validated string identifiers used across workflow definitions.
//!
//! Unlike [`crate::id::RunId`], these are user-authored strings rather than
//! random UUIDs, so they get their own lightweight newtypes with parsing
//! rules instead of `domain_key`'s UUID wrapper. The shape (a `Key(String)`
//! newtype with a `KeyParseError` enum) follows the same pattern the
//! teacher codebase uses for its own dotted-identifier `Key` type.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned when parsing any of the identifier newtypes in this module.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KeyParseError {
    /// The input was empty or all whitespace.
    #[error("identifier cannot be empty")]
    Empty,

    /// The input contained characters the identifier kind disallows.
    #[error("identifier `{0}` contains invalid characters")]
    InvalidCharacters(String),

    /// A `WorkflowId` matched neither the `template-*` prefix nor UUID syntax.
    #[error("workflow id `{0}` must start with `template-` or be a valid UUID")]
    NotTemplateOrUuid(String),
}

/// A within-workflow-unique identifier for a [`WorkflowNode`](crate::NodeId) or edge.
///
/// Validation only requires a non-empty, trimmed string — node and edge ids
/// are author-chosen labels (`"fetch_task"`, `"n3"`, ...), not a fixed format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// A within-workflow-unique identifier for a [`WorkflowEdge`](crate::EdgeId).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

/// Identifier for a [`WorkflowDefinition`](crate::WorkflowId).
///
/// Spec invariant: `id` matches `^template-.*|uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

/// A dotted node-type identifier such as `trigger.event` or `action.run_agent`.
///
/// Format: one or more lowercase-ascii-alphanumeric-or-underscore segments
/// joined by single dots; the first segment is conventionally the category
/// (`trigger`, `condition`, `flow`, `loop`, `action`, `meeting`, `notify`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTypeId(String);

macro_rules! simple_id_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Parse from any string-like input, trimming surrounding whitespace.
            pub fn new(s: impl AsRef<str>) -> Result<Self, KeyParseError> {
                let trimmed = s.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(KeyParseError::Empty);
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the underlying `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $ty {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = KeyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> String {
                id.0
            }
        }
    };
}

simple_id_newtype!(NodeId);
simple_id_newtype!(EdgeId);

impl WorkflowId {
    /// Parse a workflow id, enforcing the `template-*` or UUID invariant.
    pub fn new(s: impl AsRef<str>) -> Result<Self, KeyParseError> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let is_template = trimmed.starts_with("template-");
        let is_uuid = uuid::Uuid::parse_str(trimmed).is_ok();
        if !is_template && !is_uuid {
            return Err(KeyParseError::NotTemplateOrUuid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Mint a fresh workflow id of the `uuid` form.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the underlying `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for WorkflowId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl NodeTypeId {
    /// Parse a dotted node-type identifier.
    pub fn new(s: impl AsRef<str>) -> Result<Self, KeyParseError> {
        let trimmed = s.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let valid = trimmed
            .split('.')
            .all(|segment| !segment.is_empty() && segment.chars().all(is_key_char))
            && trimmed.contains('.');
        if !valid {
            return Err(KeyParseError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The category prefix — the segment before the first dot.
    pub fn category(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

impl Deref for NodeTypeId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeTypeId {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_rejects_empty() {
        assert_eq!(NodeId::new(""), Err(KeyParseError::Empty));
        assert_eq!(NodeId::new("   "), Err(KeyParseError::Empty));
    }

    #[test]
    fn node_id_trims_whitespace() {
        let id = NodeId::new("  fetch_task  ").unwrap();
        assert_eq!(id.as_str(), "fetch_task");
    }

    #[test]
    fn workflow_id_accepts_template_prefix() {
        let id = WorkflowId::new("template-agent-fleet").unwrap();
        assert_eq!(id.as_str(), "template-agent-fleet");
    }

    #[test]
    fn workflow_id_accepts_uuid() {
        let uuid_str = uuid::Uuid::new_v4().to_string();
        let id = WorkflowId::new(&uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);
    }

    #[test]
    fn workflow_id_rejects_other_strings() {
        let err = WorkflowId::new("my-workflow").unwrap_err();
        assert!(matches!(err, KeyParseError::NotTemplateOrUuid(_)));
    }

    #[test]
    fn workflow_id_generate_is_uuid_form() {
        let id = WorkflowId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn node_type_id_requires_dot() {
        assert!(NodeTypeId::new("trigger").is_err());
        assert!(NodeTypeId::new("trigger.event").is_ok());
    }

    #[test]
    fn node_type_id_rejects_uppercase() {
        assert!(NodeTypeId::new("Trigger.Event").is_err());
    }

    #[test]
    fn node_type_id_category() {
        let id = NodeTypeId::new("action.run_agent").unwrap();
        assert_eq!(id.category(), "action");
    }

    #[test]
    fn node_type_id_allows_underscored_subtype() {
        let id = NodeTypeId::new("action.execute_workflow").unwrap();
        assert_eq!(id.as_str(), "action.execute_workflow");
    }

    #[test]
    fn serde_roundtrip_node_type_id() {
        let id = NodeTypeId::new("condition.switch").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"condition.switch\"");
        let back: NodeTypeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
