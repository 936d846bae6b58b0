//! Workflow data model (spec §3): `WorkflowDefinition`, `WorkflowNode`,
//! `WorkflowEdge`, and the reserved scheduler-consumed config keys.

use chrono::{DateTime, Utc};
use fleet_core::{EdgeId, NodeId, NodeTypeId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Primary kind tag, e.g. `"manual"`, `"event"` — advisory, not
    /// authoritative (the authoritative trigger set is each trigger
    /// node's own `type`).
    pub trigger: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub replaces: Option<String>,
    #[serde(default, rename = "templateState")]
    pub template_state: Option<Value>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Monotonic integer bumped on each save.
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeTypeId,
    #[serde(default)]
    pub label: Option<String>,
    /// Advisory builder-UI placement; the engine never reads this.
    #[serde(default)]
    pub position: Option<NodePosition>,
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl WorkflowNode {
    fn config_field(&self, key: &str) -> Option<&Value> {
        self.config.as_object().and_then(|m| m.get(key))
    }

    /// `config.retryable === false` forces zero retries regardless of
    /// `maxRetries` (spec §4.6 step 3).
    #[must_use]
    pub fn retryable(&self) -> bool {
        !matches!(self.config_field("retryable"), Some(Value::Bool(false)))
    }

    /// `config.maxRetries` if present and a finite non-negative integer.
    #[must_use]
    pub fn max_retries_override(&self) -> Option<u32> {
        self.config_field("maxRetries")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    #[must_use]
    pub fn retry_delay_ms(&self) -> u64 {
        self.config_field("retryDelayMs").and_then(Value::as_u64).unwrap_or(1000)
    }

    /// Timeout override priority: `config.timeout`, `config.timeoutMs`,
    /// `node.timeout`, `node.timeoutMs` (spec §4.6 step 4). `node.timeout`
    /// / `node.timeoutMs` aren't modeled as struct fields since the spec
    /// only names them as config-equivalent fallbacks; author them under
    /// `config` and this resolves identically.
    #[must_use]
    pub fn timeout_override_ms(&self) -> Option<u64> {
        self.config_field("timeout")
            .or_else(|| self.config_field("timeoutMs"))
            .and_then(Value::as_u64)
    }

    #[must_use]
    pub fn continue_on_error(&self) -> bool {
        matches!(self.config_field("continueOnError"), Some(Value::Bool(true)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_source_port")]
    pub source_port: String,
    #[serde(default)]
    pub condition: Option<String>,
}

fn default_source_port() -> String {
    "default".to_string()
}
