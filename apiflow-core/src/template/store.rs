use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::PersistError;
use crate::template::processor::placeholder_name;
use crate::types::{ParamMap, RouteTemplate};

/// Holds one route template per (service, action) pair.
///
/// Adding a template derives its path-parameter list from the endpoint and
/// scans endpoint, query, and body for `{{name?}}` markers; both derivations
/// are repeated when templates are loaded from disk.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, BTreeMap<String, RouteTemplate>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&mut self, service: &str, action: &str, mut route: RouteTemplate) {
        route.path_params = extract_path_params(&route.endpoint);
        scan_for_optional_params(&mut route);
        debug!(
            service,
            action,
            method = %route.method,
            endpoint = %route.endpoint,
            "registered route template"
        );
        self.templates
            .entry(service.to_string())
            .or_default()
            .insert(action.to_string(), route);
    }

    pub fn get(&self, service: &str, action: &str) -> Option<&RouteTemplate> {
        self.templates.get(service)?.get(action)
    }

    pub fn has(&self, service: &str, action: &str) -> bool {
        self.get(service, action).is_some()
    }

    /// Writes every template as `{ "<service>": { "<action>": {...} } }`.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(&self.templates)?;
        std::fs::write(path, data).map_err(|source| PersistError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads templates from a JSON file and merges them over existing ones.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let loaded: BTreeMap<String, BTreeMap<String, RouteTemplate>> =
            serde_json::from_str(&data).map_err(|source| PersistError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        for (service, routes) in loaded {
            for (action, route) in routes {
                self.add_template(&service, &action, route);
            }
        }
        Ok(())
    }
}

/// Parameter names from `{{...}}` segments of the endpoint, `?` stripped.
fn extract_path_params(endpoint: &str) -> Vec<String> {
    endpoint
        .split('/')
        .filter_map(|segment| placeholder_name(segment).map(|(name, _)| name.to_string()))
        .collect()
}

fn scan_for_optional_params(route: &mut RouteTemplate) {
    let mut optional = std::mem::take(&mut route.optional_params);
    for segment in route.endpoint.split('/') {
        if let Some((name, true)) = placeholder_name(segment) {
            optional.insert(name.to_string());
        }
    }
    scan_map(&route.body, &mut optional);
    scan_map(&route.query_params, &mut optional);
    route.optional_params = optional;
}

fn scan_map(map: &ParamMap, optional: &mut BTreeSet<String>) {
    for value in map.values() {
        match value {
            JsonValue::String(s) => {
                if let Some((name, true)) = placeholder_name(s) {
                    optional.insert(name.to_string());
                }
            }
            JsonValue::Object(nested) => scan_map(nested, optional),
            JsonValue::Array(items) => {
                for item in items {
                    if let JsonValue::Object(nested) = item {
                        scan_map(nested, optional);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(pairs: &[(&str, JsonValue)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn derives_path_params_from_endpoint() {
        let mut store = TemplateStore::new();
        store.add_template(
            "api",
            "get_user",
            RouteTemplate::new("GET", "/api/{{version}}/users/{{user_id}}"),
        );

        let tmpl = store.get("api", "get_user").unwrap();
        assert_eq!(tmpl.path_params, vec!["version", "user_id"]);
        assert!(tmpl.optional_params.is_empty());
    }

    #[test]
    fn optional_marker_is_stripped_and_recorded() {
        let mut store = TemplateStore::new();
        store.add_template(
            "api",
            "list",
            RouteTemplate::new("GET", "/users/{{filter?}}"),
        );

        let tmpl = store.get("api", "list").unwrap();
        assert_eq!(tmpl.path_params, vec!["filter"]);
        assert!(tmpl.optional_params.contains("filter"));
    }

    #[test]
    fn scans_body_and_query_for_optional_params() {
        let mut store = TemplateStore::new();
        let route = RouteTemplate::new("POST", "/users")
            .with_body(body(&[
                ("name", json!("{{name}}")),
                ("age", json!("{{age?}}")),
                ("nested", json!({"bio": "{{bio?}}"})),
            ]))
            .with_query_params(body(&[("page", json!("{{page?}}"))]));
        store.add_template("api", "create", route);

        let tmpl = store.get("api", "create").unwrap();
        assert!(tmpl.optional_params.contains("age"));
        assert!(tmpl.optional_params.contains("bio"));
        assert!(tmpl.optional_params.contains("page"));
        assert!(!tmpl.optional_params.contains("name"));
    }

    #[test]
    fn save_and_load_round_trip_rescans() {
        let mut store = TemplateStore::new();
        store.add_template(
            "api",
            "create",
            RouteTemplate::new("POST", "/users/{{org?}}")
                .with_body(body(&[("age", json!("{{age?}}"))])),
        );

        let file = tempfile::NamedTempFile::new().unwrap();
        store.save_to_file(file.path()).unwrap();

        let mut loaded = TemplateStore::new();
        loaded.load_from_file(file.path()).unwrap();

        let tmpl = loaded.get("api", "create").unwrap();
        assert_eq!(tmpl.path_params, vec!["org"]);
        assert!(tmpl.optional_params.contains("org"));
        assert!(tmpl.optional_params.contains("age"));
    }

    #[test]
    fn load_merges_over_existing_templates() {
        let mut first = TemplateStore::new();
        first.add_template("api", "old", RouteTemplate::new("GET", "/old"));

        let mut second = TemplateStore::new();
        second.add_template("api", "new", RouteTemplate::new("GET", "/new"));
        let file = tempfile::NamedTempFile::new().unwrap();
        second.save_to_file(file.path()).unwrap();

        first.load_from_file(file.path()).unwrap();
        assert!(first.has("api", "old"));
        assert!(first.has("api", "new"));
    }
}
