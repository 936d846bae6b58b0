//! Template Resolver (spec §4.1): substitutes `{{path}}` placeholders in
//! config values and condition expressions against context data and node
//! outputs.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Read-only view the resolver dereferences `{{path}}` placeholders
/// against: `context.data` first, then `node_outputs[firstSegment]`.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub data: &'a Value,
    pub node_outputs: &'a HashMap<String, Value>,
}

impl<'a> TemplateContext<'a> {
    #[must_use]
    pub fn new(data: &'a Value, node_outputs: &'a HashMap<String, Value>) -> Self {
        Self { data, node_outputs }
    }

    /// Resolution order from spec §4.1: (a) `path` in `data`, (b) first
    /// segment as a node id with the rest resolved in that node's output,
    /// (c) `None` if neither resolves (caller leaves the literal in place).
    fn resolve_path(&self, path: &str) -> Option<Value> {
        if let Some(value) = resolve_dotted(self.data, path) {
            return Some(value);
        }
        let (node_id, rest) = match path.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path, None),
        };
        let output = self.node_outputs.get(node_id)?;
        match rest {
            Some(rest) => resolve_dotted(output, rest),
            None => Some(output.clone()),
        }
    }
}

fn resolve_dotted(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object().and_then(|map| map.get(segment))?;
    }
    Some(current.clone())
}

/// A single `{{...}}` occurrence found in a template string.
struct Placeholder {
    start: usize,
    end: usize, // exclusive, past the closing `}}`
    path: String,
}

fn find_placeholders(source: &str) -> Vec<Placeholder> {
    let bytes = source.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if let Some(close) = source[i + 2..].find("}}") {
                let path_start = i + 2;
                let path_end = i + 2 + close;
                let path = source[path_start..path_end].trim().to_string();
                out.push(Placeholder { start: i, end: path_end + 2, path });
                i = path_end + 2;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every `{{path}}` occurrence in a single string.
///
/// If the whole string is exactly one placeholder, the resolved value is
/// returned with its original JSON type (spec §4.1's "single placeholder"
/// carve-out). Otherwise every resolved placeholder is canonically
/// stringified and spliced back in; unresolved placeholders are left as
/// the literal `{{path}}` text.
#[must_use]
pub fn resolve_template_string(source: &str, ctx: &TemplateContext<'_>) -> Value {
    let placeholders = find_placeholders(source);
    if placeholders.is_empty() {
        return Value::String(source.to_string());
    }

    if placeholders.len() == 1 && placeholders[0].start == 0 && placeholders[0].end == source.len() {
        return match ctx.resolve_path(&placeholders[0].path) {
            Some(value) => value,
            None => Value::String(source.to_string()),
        };
    }

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for placeholder in &placeholders {
        out.push_str(&source[cursor..placeholder.start]);
        match ctx.resolve_path(&placeholder.path) {
            Some(value) => out.push_str(&canonical_string(&value)),
            None => out.push_str(&source[placeholder.start..placeholder.end]),
        }
        cursor = placeholder.end;
    }
    out.push_str(&source[cursor..]);
    Value::String(out)
}

/// Recursively resolve templates through a node config tree (spec §4.1:
/// "applied recursively through nested objects and arrays ... primitives
/// and non-strings pass through untouched").
#[must_use]
pub fn resolve_value(value: &Value, ctx: &TemplateContext<'_>) -> Value {
    match value {
        Value::String(s) => resolve_template_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_value(item, ctx)).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                out.insert(key.clone(), resolve_value(val, ctx));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_outputs() -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("fetch".to_string(), json!({"status": 200, "body": {"id": 42}}));
        map
    }

    #[test]
    fn resolves_from_context_data() {
        let data = json!({"user": {"name": "ada"}});
        let outputs = HashMap::new();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("hello {{user.name}}", &ctx), json!("hello ada"));
    }

    #[test]
    fn resolves_from_node_output_when_not_in_data() {
        let data = json!({});
        let outputs = node_outputs();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("{{fetch.body.id}}", &ctx), json!(42));
    }

    #[test]
    fn leaves_unresolved_placeholder_literal() {
        let data = json!({});
        let outputs = HashMap::new();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("{{nope.path}}", &ctx), json!("{{nope.path}}"));
    }

    #[test]
    fn single_placeholder_preserves_type() {
        let data = json!({"count": 5, "items": [1, 2, 3], "flag": true});
        let outputs = HashMap::new();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("{{count}}", &ctx), json!(5));
        assert_eq!(resolve_template_string("{{items}}", &ctx), json!([1, 2, 3]));
        assert_eq!(resolve_template_string("{{flag}}", &ctx), json!(true));
    }

    #[test]
    fn embedded_placeholder_is_stringified() {
        let data = json!({"count": 5});
        let outputs = HashMap::new();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("total: {{count}} items", &ctx), json!("total: 5 items"));
    }

    #[test]
    fn recursive_config_resolution() {
        let data = json!({"id": "abc"});
        let outputs = HashMap::new();
        let ctx = TemplateContext::new(&data, &outputs);
        let config = json!({"url": "https://x/{{id}}", "retries": 3, "tags": ["{{id}}", "static"]});
        let resolved = resolve_value(&config, &ctx);
        assert_eq!(
            resolved,
            json!({"url": "https://x/abc", "retries": 3, "tags": ["abc", "static"]})
        );
    }

    #[test]
    fn data_takes_precedence_over_node_output_with_same_first_segment() {
        let data = json!({"fetch": "shadowed"});
        let outputs = node_outputs();
        let ctx = TemplateContext::new(&data, &outputs);
        assert_eq!(resolve_template_string("{{fetch}}", &ctx), json!("shadowed"));
    }
}
