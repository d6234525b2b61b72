use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::types::ParamMap;

static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\[(\d+)\]$").expect("valid"));

/// Reads a nested value out of a decoded JSON mapping by dotted path.
///
/// A segment of the form `name[i]` resolves `name` to an array and indexes
/// it. Any failure along the way (non-mapping parent, missing key, non-array
/// where an index was given, out-of-bounds index) yields `None`; callers
/// treat that as "field not extractable" rather than an error.
pub fn extract_value<'a>(data: &'a ParamMap, path: &str) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let mut current = lookup(data, parts.next()?)?;
    for part in parts {
        current = lookup(current.as_object()?, part)?;
    }
    Some(current)
}

fn lookup<'a>(map: &'a ParamMap, part: &str) -> Option<&'a JsonValue> {
    match INDEX_RE.captures(part) {
        Some(caps) => {
            let field = caps.get(1).map_or("", |m| m.as_str());
            let index: usize = caps[2].parse().ok()?;
            map.get(field)?.as_array()?.get(index)
        }
        None => map.get(part),
    }
}
