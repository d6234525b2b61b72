use std::collections::{BTreeMap, BTreeSet};

use crate::types::ParamMap;

/// A declarative description of one HTTP endpoint.
///
/// The endpoint, query values, and body scalars may contain `{{name}}` /
/// `{{name?}}` placeholders; `path_params` and `optional_params` are derived
/// when the template is added to a [`crate::TemplateStore`] (and re-derived
/// on load, so neither is trusted from persisted data).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RouteTemplate {
    pub method: String,

    pub endpoint: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(
        default,
        rename = "pathParams",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub path_params: Vec<String>,

    #[serde(
        default,
        rename = "queryParams",
        skip_serializing_if = "ParamMap::is_empty"
    )]
    pub query_params: ParamMap,

    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub body: ParamMap,

    /// Names whose absence omits the enclosing field rather than failing.
    #[serde(skip)]
    pub optional_params: BTreeSet<String>,
}

impl RouteTemplate {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_params(mut self, params: ParamMap) -> Self {
        self.query_params.extend(params);
        self
    }

    pub fn with_body(mut self, body: ParamMap) -> Self {
        self.body.extend(body);
        self
    }
}
