use crate::ast::{BinaryOp, Builtin, Expr, MemberKey, UnaryOp};
use crate::context::EvalContext;
use crate::error::ExpressionError;
use crate::parser::MAX_RECURSION_DEPTH;
use serde_json::Value;

/// Evaluate an already-parsed expression against `ctx`.
pub fn eval(expr: &Expr, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    eval_inner(expr, ctx, 0)
}

/// Parse and evaluate `source` in one step.
pub fn eval_str(source: &str, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    let expr = crate::parser::parse(source)?;
    eval(&expr, ctx)
}

/// `eval_str`, collapsing any evaluation error to `false` — the
/// edge-routing behavior spec §4.2 requires ("An expression that throws
/// evaluates to `false` for edge routing").
pub fn eval_edge_condition(source: &str, ctx: &EvalContext) -> bool {
    match eval_str(source, ctx) {
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    }
}

fn guard_depth(depth: usize) -> Result<(), ExpressionError> {
    if depth > MAX_RECURSION_DEPTH {
        Err(ExpressionError::RecursionLimitExceeded)
    } else {
        Ok(())
    }
}

fn eval_inner(expr: &Expr, ctx: &EvalContext, depth: usize) -> Result<Value, ExpressionError> {
    guard_depth(depth)?;
    match expr {
        Expr::Number(n) => Ok(serde_json::json!(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Binding(name) => Ok(resolve_binding(name, ctx)?),
        Expr::Member { object, key } => {
            let base = eval_inner(object, ctx, depth + 1)?;
            eval_member(&base, key, ctx, depth)
        }
        Expr::BuiltinCall { builtin, args } => eval_builtin(*builtin, args, ctx, depth),
        Expr::MethodCall { object, method, args } => eval_method_call(object, method, args, ctx, depth),
        Expr::Unary { op, expr } => {
            let value = eval_inner(expr, ctx, depth + 1)?;
            Ok(eval_unary(*op, &value))
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, depth),
        Expr::Ternary { cond, then_branch, else_branch } => {
            let cond_value = eval_inner(cond, ctx, depth + 1)?;
            if is_truthy(&cond_value) {
                eval_inner(then_branch, ctx, depth + 1)
            } else {
                eval_inner(else_branch, ctx, depth + 1)
            }
        }
    }
}

fn resolve_binding(name: &str, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    match name {
        "output" => Ok(ctx.output.clone()),
        "data" => Ok(ctx.data.clone()),
        "status" => Ok(ctx.status.clone()),
        "ctx" => Ok(Value::Null), // only meaningful through .getNodeOutput(); see eval_method_call
        other => Err(ExpressionError::UnknownBinding(format!("${other}"))),
    }
}

fn eval_member(base: &Value, key: &MemberKey, ctx: &EvalContext, depth: usize) -> Result<Value, ExpressionError> {
    match key {
        MemberKey::Name(name) => Ok(base.get(name).cloned().unwrap_or(Value::Null)),
        MemberKey::Index(index_expr) => {
            let index = eval_inner(index_expr, ctx, depth + 1)?;
            match (base, &index) {
                (Value::Array(items), Value::Number(n)) => {
                    let idx = n.as_f64().unwrap_or(-1.0);
                    if idx < 0.0 {
                        return Ok(Value::Null);
                    }
                    Ok(items.get(idx as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Object(_), Value::String(s)) => Ok(base.get(s).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            }
        }
    }
}

fn eval_builtin(builtin: Builtin, args: &[Expr], ctx: &EvalContext, depth: usize) -> Result<Value, ExpressionError> {
    match builtin {
        Builtin::ArrayIsArray => {
            if args.len() != 1 {
                return Err(ExpressionError::ArityMismatch("Array.isArray", 1));
            }
            let value = eval_inner(&args[0], ctx, depth + 1)?;
            Ok(Value::Bool(value.is_array()))
        }
        Builtin::JsonParse => {
            if args.len() != 1 {
                return Err(ExpressionError::ArityMismatch("JSON.parse", 1));
            }
            let value = eval_inner(&args[0], ctx, depth + 1)?;
            let Value::String(text) = value else {
                return Err(ExpressionError::JsonParse("argument is not a string".to_string()));
            };
            serde_json::from_str(&text).map_err(|e| ExpressionError::JsonParse(e.to_string()))
        }
    }
}

fn eval_method_call(
    object: &Expr,
    method: &str,
    args: &[Expr],
    ctx: &EvalContext,
    depth: usize,
) -> Result<Value, ExpressionError> {
    if let Expr::Binding(name) = object {
        if name == "ctx" && method == "getNodeOutput" {
            if args.len() != 1 {
                return Err(ExpressionError::ArityMismatch("getNodeOutput", 1));
            }
            let id_value = eval_inner(&args[0], ctx, depth + 1)?;
            let Value::String(id) = id_value else {
                return Err(ExpressionError::TypeMismatch {
                    op: "getNodeOutput",
                    lhs: type_name(&id_value),
                    rhs: "string",
                });
            };
            return Ok(ctx.get_node_output(&id));
        }
    }

    let base = eval_inner(object, ctx, depth + 1)?;
    match method {
        "includes" => {
            if args.len() != 1 {
                return Err(ExpressionError::ArityMismatch("includes", 1));
            }
            let needle = eval_inner(&args[0], ctx, depth + 1)?;
            match &base {
                Value::Array(items) => Ok(Value::Bool(items.iter().any(|v| strict_eq(v, &needle)))),
                Value::String(haystack) => match &needle {
                    Value::String(s) => Ok(Value::Bool(haystack.contains(s.as_str()))),
                    other => Err(ExpressionError::TypeMismatch {
                        op: "includes",
                        lhs: "string",
                        rhs: type_name(other),
                    }),
                },
                other => Err(ExpressionError::NotIterable(type_name(other).to_string())),
            }
        }
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!is_truthy(value)),
        UnaryOp::Neg => serde_json::json!(-to_number(value)),
        UnaryOp::Typeof => Value::String(type_name(value).to_string()),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &EvalContext, depth: usize) -> Result<Value, ExpressionError> {
    // Short-circuit operators evaluate the right side lazily.
    if op == BinaryOp::And {
        let l = eval_inner(lhs, ctx, depth + 1)?;
        return if !is_truthy(&l) { Ok(l) } else { eval_inner(rhs, ctx, depth + 1) };
    }
    if op == BinaryOp::Or {
        let l = eval_inner(lhs, ctx, depth + 1)?;
        return if is_truthy(&l) { Ok(l) } else { eval_inner(rhs, ctx, depth + 1) };
    }

    let l = eval_inner(lhs, ctx, depth + 1)?;
    let r = eval_inner(rhs, ctx, depth + 1)?;

    match op {
        BinaryOp::Add => {
            if let (Value::String(_), _) | (_, Value::String(_)) = (&l, &r) {
                Ok(Value::String(format!("{}{}", display_value(&l), display_value(&r))))
            } else {
                Ok(serde_json::json!(to_number(&l) + to_number(&r)))
            }
        }
        BinaryOp::Sub => Ok(serde_json::json!(to_number(&l) - to_number(&r))),
        BinaryOp::Mul => Ok(serde_json::json!(to_number(&l) * to_number(&r))),
        BinaryOp::Div => Ok(serde_json::json!(to_number(&l) / to_number(&r))),
        BinaryOp::Rem => Ok(serde_json::json!(to_number(&l) % to_number(&r))),
        BinaryOp::Lt => Ok(Value::Bool(compare(&l, &r) == Some(std::cmp::Ordering::Less))),
        BinaryOp::Le => Ok(Value::Bool(matches!(compare(&l, &r), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)))),
        BinaryOp::Gt => Ok(Value::Bool(compare(&l, &r) == Some(std::cmp::Ordering::Greater))),
        BinaryOp::Ge => Ok(Value::Bool(matches!(compare(&l, &r), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)))),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(&l, &r))),
        BinaryOp::StrictNotEq => Ok(Value::Bool(!strict_eq(&l, &r))),
        BinaryOp::LooseEq => Ok(Value::Bool(loose_eq(&l, &r))),
        BinaryOp::LooseNotEq => Ok(Value::Bool(!loose_eq(&l, &r))),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Null => 0.0,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    a == b
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if std::mem::discriminant(a) == std::mem::discriminant(b) {
        return strict_eq(a, b);
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => to_number(a) == to_number(b),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    to_number(a).partial_cmp(&to_number(b))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "object", // matches JS `typeof null === "object"`
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "object",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with_data(data: Value) -> EvalContext {
        EvalContext { output: Value::Null, data, status: Value::Null, node_outputs: Default::default() }
    }

    #[test]
    fn property_access_and_comparison() {
        let ctx = ctx_with_data(json!({"count": 5}));
        let result = eval_str("$data.count >= 5", &ctx).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn string_concatenation() {
        let ctx = ctx_with_data(json!({"name": "world"}));
        let result = eval_str("\"hello \" + $data.name", &ctx).unwrap();
        assert_eq!(result, json!("hello world"));
    }

    #[test]
    fn ternary_picks_branch() {
        let ctx = ctx_with_data(json!({}));
        let result = eval_str("1 < 2 ? \"yes\" : \"no\"", &ctx).unwrap();
        assert_eq!(result, json!("yes"));
    }

    #[test]
    fn typeof_on_null_is_object() {
        let ctx = ctx_with_data(Value::Null);
        let result = eval_str("typeof null", &ctx).unwrap();
        assert_eq!(result, json!("object"));
    }

    #[test]
    fn strict_vs_loose_equality() {
        let ctx = ctx_with_data(json!({}));
        assert_eq!(eval_str("1 === \"1\"", &ctx).unwrap(), json!(false));
        assert_eq!(eval_str("1 == \"1\"", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn array_includes_membership() {
        let ctx = ctx_with_data(json!({"tags": ["a", "b"]}));
        let result = eval_str("$data.tags.includes(\"b\")", &ctx).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn ctx_get_node_output() {
        let mut outputs = std::collections::HashMap::new();
        outputs.insert("n1".to_string(), json!({"ok": true}));
        let ctx = EvalContext { output: Value::Null, data: Value::Null, status: Value::Null, node_outputs: outputs };
        let result = eval_str("$ctx.getNodeOutput(\"n1\").ok", &ctx).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn json_parse_roundtrip() {
        let ctx = ctx_with_data(json!({"raw": "{\"x\":1}"}));
        let result = eval_str("JSON.parse($data.raw).x", &ctx).unwrap();
        assert_eq!(result, json!(1));
    }

    #[test]
    fn throwing_expression_is_false_for_edge_routing() {
        let ctx = ctx_with_data(json!({}));
        assert!(!eval_edge_condition("JSON.parse($data.missing_field_causes_type_mismatch)", &ctx));
    }

    #[test]
    fn unknown_binding_is_an_error() {
        let ctx = ctx_with_data(json!({}));
        let err = eval_str("$bogus", &ctx).unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownBinding(_)));
    }

    #[test]
    fn short_circuit_and_or() {
        let ctx = ctx_with_data(json!({}));
        assert_eq!(eval_str("false && $bogus", &ctx).unwrap(), json!(false));
        assert_eq!(eval_str("true || $bogus", &ctx).unwrap(), json!(true));
    }
}
