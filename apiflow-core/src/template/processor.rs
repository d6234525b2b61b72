use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

use crate::types::ParamMap;

/// Splits a whole-string placeholder into its bare name and optional flag.
///
/// Only strings that are exactly `{{name}}` or `{{name?}}` qualify; embedded
/// placeholders inside longer strings are literals at this layer (the
/// workflow expression evaluator handles those).
pub fn placeholder_name(s: &str) -> Option<(&str, bool)> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    match inner.strip_suffix('?') {
        Some(name) => Some((name, true)),
        None => Some((inner, false)),
    }
}

/// Substitutes placeholders throughout a template value tree.
///
/// Returns `None` when the node should be omitted: an optional placeholder
/// whose value is absent or empty, a required placeholder with no value (the
/// caller distinguishes the two and raises the error), or a container whose
/// children were all omitted.
pub fn process_value(
    value: &JsonValue,
    params: &ParamMap,
    optional_params: &BTreeSet<String>,
) -> Option<JsonValue> {
    match value {
        JsonValue::String(s) => match placeholder_name(s) {
            Some((name, suffix_optional)) => {
                let is_optional = suffix_optional || optional_params.contains(name);
                match params.get(name) {
                    Some(supplied) => {
                        if is_optional && is_empty_value(supplied) {
                            return None;
                        }
                        Some(supplied.clone())
                    }
                    None => None,
                }
            }
            None => Some(JsonValue::String(s.clone())),
        },
        JsonValue::Object(map) => {
            let mut processed = ParamMap::new();
            for (key, val) in map {
                if let Some(v) = process_value(val, params, optional_params) {
                    processed.insert(key.clone(), v);
                }
            }
            if processed.is_empty() {
                None
            } else {
                Some(JsonValue::Object(processed))
            }
        }
        JsonValue::Array(items) => {
            let mut processed = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = process_value(item, params, optional_params) {
                    processed.push(v);
                }
            }
            if processed.is_empty() {
                None
            } else {
                Some(JsonValue::Array(processed))
            }
        }
        other => Some(other.clone()),
    }
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}
