//! The mini-expression language used by workflow steps and aggregators.
//!
//! Step parameters recognize `{{...}}` expressions: a whole-string expression
//! yields the referenced variable's value (or a ternary result), while
//! embedded expressions are substituted into the surrounding string. This is
//! deliberately richer than the template layer, which only binds whole-string
//! placeholders.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use apiflow_core::expressions::extract_value;
use apiflow_core::ParamMap;

static EXPR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(.+?)\}\}").expect("valid"));

pub fn is_expression(s: &str) -> bool {
    EXPR_RE.is_match(s)
}

/// Evaluates a `{{...}}` expression against the variable scope.
///
/// A whole-string expression returns the variable's value with its type
/// intact (or the ternary branch value). Multiple occurrences inside a
/// longer string are replaced by the stringified variable values. Unknown
/// variables are an error either way.
pub fn evaluate_expression(expr: &str, scope: &ParamMap) -> Result<JsonValue, String> {
    let matches: Vec<_> = EXPR_RE.captures_iter(expr).collect();
    if matches.is_empty() {
        return Ok(JsonValue::String(expr.to_string()));
    }

    if matches.len() == 1 && &matches[0][0] == expr {
        let inner = &matches[0][1];
        if inner.contains('?') {
            return evaluate_ternary(inner, scope);
        }
        return scope
            .get(inner)
            .cloned()
            .ok_or_else(|| format!("variable {inner} not found"));
    }

    let mut result = expr.to_string();
    for caps in &matches {
        let name = &caps[1];
        let value = scope
            .get(name)
            .ok_or_else(|| format!("variable {name} not found"))?;
        result = result.replacen(&caps[0], &display_value(value), 1);
    }
    Ok(JsonValue::String(result))
}

/// `cond ? t : f` where cond is `a == b`, `a != b`, or a bare truthiness
/// check, and every operand may be a variable, quoted string, number, or
/// boolean literal.
fn evaluate_ternary(expr: &str, scope: &ParamMap) -> Result<JsonValue, String> {
    let parts: Vec<&str> = expr.split('?').collect();
    if parts.len() != 2 {
        return Err(format!("invalid ternary expression: {expr}"));
    }
    let condition = parts[0].trim();

    let choices: Vec<&str> = parts[1].split(':').collect();
    if choices.len() != 2 {
        return Err(format!("invalid ternary expression: {expr}"));
    }
    let true_value = choices[0].trim();
    let false_value = choices[1].trim();

    let branch = |taken: bool| {
        operand_value(if taken { true_value } else { false_value }, scope)
    };

    if condition.contains("==") {
        let sides: Vec<&str> = condition.split("==").collect();
        if sides.len() != 2 {
            return Err(format!("invalid equality condition: {condition}"));
        }
        let left = operand_value(sides[0].trim(), scope);
        let right = operand_value(sides[1].trim(), scope);
        return Ok(branch(json_eq(&left, &right)));
    }

    if condition.contains("!=") {
        let sides: Vec<&str> = condition.split("!=").collect();
        if sides.len() != 2 {
            return Err(format!("invalid inequality condition: {condition}"));
        }
        let left = operand_value(sides[0].trim(), scope);
        let right = operand_value(sides[1].trim(), scope);
        return Ok(branch(!json_eq(&left, &right)));
    }

    Ok(branch(is_truthy(&operand_value(condition, scope))))
}

/// Resolves a ternary operand: quoted string, numeric or boolean literal,
/// variable reference, else null.
fn operand_value(expr: &str, scope: &ParamMap) -> JsonValue {
    if expr.len() >= 2
        && ((expr.starts_with('\'') && expr.ends_with('\''))
            || (expr.starts_with('"') && expr.ends_with('"')))
    {
        return JsonValue::String(expr[1..expr.len() - 1].to_string());
    }

    if let Ok(n) = expr.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return JsonValue::Number(num);
        }
    }

    if expr == "true" {
        return JsonValue::Bool(true);
    }
    if expr == "false" {
        return JsonValue::Bool(false);
    }

    scope.get(expr).cloned().unwrap_or(JsonValue::Null)
}

/// Evaluates one aggregator expression against the final scope.
///
/// Beyond the step-parameter expressions above, aggregators support
/// `name.length`, `input.<path>` (the scope itself is the root), and
/// `<var>.<path>` dotted lookups, plus bare literals.
pub fn evaluate_aggregator(expr: &str, scope: &ParamMap) -> Result<JsonValue, String> {
    if let Some(var_name) = expr.strip_suffix(".length") {
        return match scope.get(var_name) {
            Some(JsonValue::Array(items)) => Ok(JsonValue::from(items.len())),
            Some(JsonValue::String(s)) => Ok(JsonValue::from(s.len())),
            Some(JsonValue::Object(map)) => Ok(JsonValue::from(map.len())),
            Some(_) => Err(format!("cannot get length of variable '{var_name}'")),
            None => Err(format!("variable '{var_name}' not found for length operation")),
        };
    }

    if expr.contains('.') && !expr.starts_with("{{") {
        let (base, path) = expr.split_once('.').unwrap_or((expr, ""));
        if base == "input" {
            return extract_value(scope, path)
                .cloned()
                .ok_or_else(|| format!("could not extract path '{path}' from input"));
        }
        let base_value = scope
            .get(base)
            .ok_or_else(|| format!("variable '{base}' not found"))?;
        let base_map = base_value
            .as_object()
            .ok_or_else(|| format!("variable '{base}' is not an object"))?;
        return extract_value(base_map, path)
            .cloned()
            .ok_or_else(|| format!("could not extract path '{path}' from variable '{base}'"));
    }

    if let Some(value) = scope.get(expr) {
        return Ok(value.clone());
    }

    if is_expression(expr) {
        return evaluate_expression(expr, scope);
    }

    if !expr.contains("{{") && !expr.contains("}}") {
        return Ok(parse_literal(expr));
    }

    Err(format!("could not evaluate expression: {expr}"))
}

fn parse_literal(s: &str) -> JsonValue {
    match s {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        "null" => return JsonValue::Null,
        _ => {}
    }
    if let Ok(n) = s.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return JsonValue::Number(num);
        }
    }
    JsonValue::String(s.to_string())
}

/// `false`, zero, empty string/sequence/mapping, and null are false.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

/// Deep equality with numbers compared by value, so `3` equals `3.0`.
pub fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|bv| json_eq(v, bv)).unwrap_or(false))
        }
        _ => false,
    }
}

/// The string form a value takes when embedded into a longer string or a URL
/// segment: strings bare, scalars via their JSON form, containers as compact
/// JSON.
pub(crate) fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}
