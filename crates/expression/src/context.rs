use serde_json::Value;
use std::collections::HashMap;

/// The four bindings the Expression Evaluator exposes (spec §4.2):
/// `$output`, `$data`, `$status`, `$ctx`.
///
/// `$ctx.getNodeOutput(id)` is the only method call `$ctx` supports, so
/// rather than modeling `$ctx` as a `Value` this context carries the full
/// output map directly and the evaluator special-cases the method call.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub output: Value,
    pub data: Value,
    pub status: Value,
    pub node_outputs: HashMap<String, Value>,
}

impl EvalContext {
    /// Bindings scoped to an edge condition: `$output` is the source
    /// node's own output, `$status` its final status.
    #[must_use]
    pub fn for_edge(
        source_output: Value,
        source_status: Value,
        data: Value,
        node_outputs: HashMap<String, Value>,
    ) -> Self {
        Self {
            output: source_output,
            data,
            status: source_status,
            node_outputs,
        }
    }

    /// Bindings scoped to a `condition.expression` node: `$output` is
    /// `outputs[nodeId]` for the node named in config, not the evaluating
    /// node's own (not-yet-produced) output.
    #[must_use]
    pub fn for_condition_node(
        named_output: Value,
        data: Value,
        node_outputs: HashMap<String, Value>,
    ) -> Self {
        Self {
            output: named_output,
            data,
            status: Value::Null,
            node_outputs,
        }
    }

    pub fn get_node_output(&self, node_id: &str) -> Value {
        self.node_outputs.get(node_id).cloned().unwrap_or(Value::Null)
    }
}
