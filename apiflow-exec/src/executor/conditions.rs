use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use apiflow_core::{ConditionKind, ParamMap, StepCondition};

use crate::executor::eval::json_eq;

/// Decides whether a step's condition holds against the variable scope.
///
/// `exists` only needs the variable; the comparing kinds return false when
/// the variable is absent and error only on operand types they cannot
/// compare.
pub fn evaluate_condition(condition: &StepCondition, scope: &ParamMap) -> Result<bool, String> {
    match condition.kind {
        ConditionKind::Exists => Ok(matches!(
            scope.get(&condition.source_variable),
            Some(v) if !v.is_null()
        )),
        kind => match scope.get(&condition.source_variable) {
            None => Ok(false),
            Some(source) => {
                let target = condition.value.as_ref().unwrap_or(&JsonValue::Null);
                compare(kind, source, target)
            }
        },
    }
}

fn compare(kind: ConditionKind, source: &JsonValue, target: &JsonValue) -> Result<bool, String> {
    match kind {
        ConditionKind::Exists => Ok(!source.is_null()),
        ConditionKind::Equals => Ok(json_eq(source, target)),
        ConditionKind::Contains => evaluate_contains(source, target),
        ConditionKind::GreaterThan => evaluate_order(source, target, Ordering::Greater),
        ConditionKind::LessThan => evaluate_order(source, target, Ordering::Less),
    }
}

fn evaluate_contains(source: &JsonValue, target: &JsonValue) -> Result<bool, String> {
    match (source, target) {
        (JsonValue::String(s), JsonValue::String(t)) => Ok(s.contains(t.as_str())),
        (JsonValue::Array(items), _) => Ok(items.iter().any(|item| json_eq(item, target))),
        (JsonValue::Object(map), _) => Ok(target
            .as_str()
            .map(|key| map.contains_key(key))
            .unwrap_or(false)),
        _ => Err("contains condition not supported for this type".to_string()),
    }
}

fn evaluate_order(
    source: &JsonValue,
    target: &JsonValue,
    expected: Ordering,
) -> Result<bool, String> {
    if let (Some(a), Some(b)) = (to_f64(source), to_f64(target)) {
        return Ok(a.partial_cmp(&b) == Some(expected));
    }
    if let (JsonValue::String(a), JsonValue::String(b)) = (source, target) {
        return Ok(a.cmp(b) == expected);
    }
    Err("ordering condition not supported for these types".to_string())
}

/// Lenient numeric coercion: numbers as-is, strings parsed as floats.
fn to_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}
