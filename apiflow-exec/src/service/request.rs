use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use apiflow_core::template::{placeholder_name, process_value};
use apiflow_core::{ParamMap, RouteTemplate, ServiceConfig};

use crate::error::ServiceError;
use crate::executor::eval::display_value;

/// A fully prepared outgoing request, ready for an invoker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    pub method: String,
    /// Absolute URL with the query already encoded.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Pretty-printed JSON, present only when the processed body template
    /// kept at least one entry.
    pub body: Option<Vec<u8>>,
}

/// Binds a route template against the merged parameter layer.
///
/// Path placeholders substitute into the endpoint (an unsupplied optional
/// segment is dropped whole); body and query trees go through the template
/// processor, where a missing required placeholder is an error and a missing
/// optional one silently omits the field. Headers layer service globals
/// under template headers under the bearer token.
pub(crate) fn build_request(
    template: &RouteTemplate,
    config: &ServiceConfig,
    global_headers: &BTreeMap<String, String>,
    merged: &ParamMap,
) -> Result<RequestParts, ServiceError> {
    debug!(
        method = %template.method,
        endpoint = %template.endpoint,
        "preparing request from template"
    );

    let endpoint = resolve_endpoint(template, merged)?;
    let full_url = format!("{}{}", config.base_url, endpoint);
    let mut url = Url::parse(&full_url).map_err(|e| ServiceError::InvalidUrl {
        url: full_url.clone(),
        message: e.to_string(),
    })?;

    for (key, value) in &template.query_params {
        match process_value(value, merged, &template.optional_params) {
            Some(processed) => {
                url.query_pairs_mut()
                    .append_pair(key, &display_value(&processed));
            }
            None => {
                if is_optional_entry(key, value, template) {
                    continue;
                }
                return Err(ServiceError::MissingQueryParam(key.clone()));
            }
        }
    }

    let mut body = None;
    if !template.body.is_empty() {
        let mut processed_body = ParamMap::new();
        for (key, value) in &template.body {
            match process_value(value, merged, &template.optional_params) {
                Some(processed) => {
                    processed_body.insert(key.clone(), processed);
                }
                None => {
                    if is_optional_entry(key, value, template) {
                        continue;
                    }
                    return Err(ServiceError::MissingBodyParam(key.clone()));
                }
            }
        }
        if !processed_body.is_empty() {
            let json = serde_json::to_vec_pretty(&JsonValue::Object(processed_body))
                .map_err(ServiceError::EncodeBody)?;
            body = Some(json);
        }
    }

    let mut headers = global_headers.clone();
    for (name, value) in &template.headers {
        headers.insert(name.clone(), value.clone());
    }
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }

    Ok(RequestParts {
        method: template.method.clone(),
        url: url.to_string(),
        headers,
        body,
    })
}

fn resolve_endpoint(template: &RouteTemplate, merged: &ParamMap) -> Result<String, ServiceError> {
    let mut endpoint = template.endpoint.clone();
    for name in &template.path_params {
        let required_placeholder = format!("{{{{{name}}}}}");
        let optional_placeholder = format!("{{{{{name}?}}}}");

        if let Some(value) = merged.get(name) {
            let text = display_value(value);
            endpoint = endpoint
                .replace(&required_placeholder, &text)
                .replace(&optional_placeholder, &text);
        } else if endpoint.contains(&optional_placeholder) {
            endpoint = drop_segment(&endpoint, &optional_placeholder);
        } else if template.optional_params.contains(name) {
            continue;
        } else {
            return Err(ServiceError::MissingPathParam(name.clone()));
        }
    }
    Ok(endpoint)
}

/// Removes the first path segment equal to `placeholder`, including its
/// separating slash.
fn drop_segment(endpoint: &str, placeholder: &str) -> String {
    let mut parts: Vec<&str> = endpoint.split('/').collect();
    if let Some(pos) = parts.iter().position(|part| *part == placeholder) {
        parts.remove(pos);
    }
    parts.join("/")
}

/// An unprocessable entry is skipped rather than failing when its template
/// value is an optional placeholder or the key itself was scanned optional.
fn is_optional_entry(key: &str, value: &JsonValue, template: &RouteTemplate) -> bool {
    if let JsonValue::String(s) = value {
        if matches!(placeholder_name(s), Some((_, true))) {
            return true;
        }
    }
    template.optional_params.contains(key)
}
