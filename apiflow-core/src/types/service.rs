use crate::types::ParamMap;

/// Per-service configuration: where to reach it and what every call carries.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Lowest-precedence parameter layer, overridden by service-level and
    /// per-call parameters.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub default_params: ParamMap,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_default_params(mut self, params: ParamMap) -> Self {
        self.default_params.extend(params);
        self
    }
}
