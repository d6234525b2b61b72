mod request;

pub use request::RequestParts;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use apiflow_core::{ParamMap, RouteTemplate, ServiceConfig, TemplateStore, Workflow, WorkflowStep};

use crate::client::{HttpClient, HttpError, ReqwestHttpClient, StreamWriter, StreamingClient};
use crate::error::{ServiceError, WorkflowError};
use crate::executor::{ActionExecutor, WorkflowExecutor, WorkflowOutcome};
use crate::lock;
use crate::service::request::build_request;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// The declarative API client: templates plus per-service configuration in,
/// prepared requests and executed workflows out.
///
/// Cheap to share: all state lives behind an `Arc`, and the registries are
/// concurrent-readable. Most callers construct one through
/// [`crate::ServiceBuilder`].
pub struct ApiService {
    core: Arc<ServiceCore>,
    executor: WorkflowExecutor,
}

/// The state the workflow executor calls back into; split from [`ApiService`]
/// so the executor can hold it as a plain `Arc<dyn ActionExecutor>` without
/// an ownership cycle.
pub(crate) struct ServiceCore {
    configs: RwLock<BTreeMap<String, ServiceConfig>>,
    templates: RwLock<TemplateStore>,
    service_headers: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
    service_params: RwLock<BTreeMap<String, ParamMap>>,
    http: Arc<dyn HttpClient>,
    streaming: StreamingClient,
    timeout: Duration,
}

impl Default for ApiService {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiService {
    pub fn new() -> Self {
        Self::with_clients(
            Arc::new(ReqwestHttpClient::new()),
            StreamingClient::new(),
            DEFAULT_TIMEOUT,
        )
    }

    pub fn builder() -> crate::builder::ServiceBuilder {
        crate::builder::ServiceBuilder::new()
    }

    pub(crate) fn with_clients(
        http: Arc<dyn HttpClient>,
        streaming: StreamingClient,
        timeout: Duration,
    ) -> Self {
        let core = Arc::new(ServiceCore {
            configs: RwLock::new(BTreeMap::new()),
            templates: RwLock::new(TemplateStore::new()),
            service_headers: RwLock::new(BTreeMap::new()),
            service_params: RwLock::new(BTreeMap::new()),
            http,
            streaming,
            timeout,
        });
        let executor = WorkflowExecutor::new(Arc::clone(&core) as Arc<dyn ActionExecutor>);
        Self { core, executor }
    }

    // --- service configuration ---

    pub fn set_service_config(&self, name: &str, config: ServiceConfig) {
        lock::write(&self.core.configs).insert(name.to_string(), config);
    }

    pub fn service_config(&self, name: &str) -> Option<ServiceConfig> {
        lock::read(&self.core.configs).get(name).cloned()
    }

    pub fn service_url(&self, name: &str) -> Option<String> {
        lock::read(&self.core.configs)
            .get(name)
            .map(|c| c.base_url.clone())
    }

    /// Updates the base URL of an already-configured service.
    pub fn set_service_url(&self, name: &str, url: &str) {
        if let Some(config) = lock::write(&self.core.configs).get_mut(name) {
            config.base_url = url.to_string();
        }
    }

    pub fn service_token(&self, name: &str) -> Option<String> {
        lock::read(&self.core.configs)
            .get(name)
            .and_then(|c| c.token.clone())
    }

    // --- service-level headers and parameters ---

    pub fn set_service_headers(&self, name: &str, headers: BTreeMap<String, String>) {
        lock::write(&self.core.service_headers)
            .entry(name.to_string())
            .or_default()
            .extend(headers);
    }

    /// A copy of the service's global headers; callers cannot alias internal
    /// state.
    pub fn service_headers(&self, name: &str) -> BTreeMap<String, String> {
        lock::read(&self.core.service_headers)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove_service_header(&self, name: &str, header: &str) {
        if let Some(headers) = lock::write(&self.core.service_headers).get_mut(name) {
            headers.remove(header);
        }
    }

    pub fn set_service_params(&self, name: &str, params: ParamMap) {
        lock::write(&self.core.service_params)
            .entry(name.to_string())
            .or_default()
            .extend(params);
    }

    pub fn service_params(&self, name: &str) -> ParamMap {
        lock::read(&self.core.service_params)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove_service_param(&self, name: &str, param: &str) {
        if let Some(params) = lock::write(&self.core.service_params).get_mut(name) {
            params.remove(param);
        }
    }

    // --- templates ---

    pub fn add_route_template(&self, service: &str, action: &str, route: RouteTemplate) {
        lock::write(&self.core.templates).add_template(service, action, route);
    }

    pub fn save_templates(&self, path: impl AsRef<Path>) -> Result<(), ServiceError> {
        lock::read(&self.core.templates)
            .save_to_file(path)
            .map_err(ServiceError::Persist)
    }

    pub fn load_templates(&self, path: impl AsRef<Path>) -> Result<(), ServiceError> {
        lock::write(&self.core.templates)
            .load_from_file(path)
            .map_err(ServiceError::Persist)
    }

    // --- requests ---

    /// Binds the (service, action) template against the merged parameter
    /// layers without sending anything.
    pub fn prepare_request(
        &self,
        service: &str,
        action: &str,
        params: &ParamMap,
    ) -> Result<RequestParts, ServiceError> {
        self.core.prepare(service, action, params)
    }

    /// Sends a prepared request and decodes the JSON response.
    ///
    /// Returns `Ok(None)` when the response body is empty; any status outside
    /// 200-299 is an error carrying the raw body.
    pub async fn make_request<T: DeserializeOwned>(
        &self,
        parts: RequestParts,
    ) -> Result<Option<T>, ServiceError> {
        let body = self.core.send_checked(parts).await?;
        if body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(ServiceError::Decode)
    }

    /// Prepares and sends in one call.
    pub async fn perform_request<T: DeserializeOwned>(
        &self,
        service: &str,
        action: &str,
        params: &ParamMap,
    ) -> Result<Option<T>, ServiceError> {
        let parts = self.prepare_request(service, action, params)?;
        self.make_request(parts).await
    }

    /// Prepares the request and forwards the streamed response to `writer`,
    /// returning the concatenated body.
    pub async fn perform_streaming_request(
        &self,
        service: &str,
        action: &str,
        params: &ParamMap,
        writer: &mut dyn StreamWriter,
    ) -> Result<String, ServiceError> {
        let parts = self.prepare_request(service, action, params)?;
        self.core
            .streaming
            .make_streaming_request(parts, writer)
            .await
            .map_err(ServiceError::Http)
    }

    /// Executes a request addressed as `"service.action"` and returns the raw
    /// decoded response.
    pub async fn execute_request_with_params(
        &self,
        template_id: &str,
        params: &ParamMap,
    ) -> Result<JsonValue, ServiceError> {
        let parts: Vec<&str> = template_id.split('.').collect();
        let &[service, action] = parts.as_slice() else {
            return Err(ServiceError::InvalidTemplateId(template_id.to_string()));
        };
        let result = self.core.execute_action(service, action, params.clone()).await?;
        Ok(JsonValue::Object(result))
    }

    // --- workflows ---

    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), WorkflowError> {
        self.executor.register(workflow)
    }

    pub fn add_workflow_step(&self, name: &str, step: WorkflowStep) -> Result<(), WorkflowError> {
        self.executor.add_step(name, step)
    }

    /// Runs a registered workflow with the given initial parameters.
    pub async fn execute_workflow(
        &self,
        name: &str,
        params: ParamMap,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        self.executor.execute(name, params).await
    }

    pub fn get_workflow(&self, name: &str) -> Option<Workflow> {
        self.executor.get(name)
    }

    pub fn list_workflows(&self) -> Vec<String> {
        self.executor.list()
    }

    pub fn save_workflows(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
        self.executor.save_to_file(path)
    }

    pub fn load_workflows(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
        self.executor.load_from_file(path)
    }
}

impl ServiceCore {
    /// Merges the parameter layers (service defaults, then service globals,
    /// then per-call parameters) and binds the template.
    fn prepare(
        &self,
        service: &str,
        action: &str,
        params: &ParamMap,
    ) -> Result<RequestParts, ServiceError> {
        let templates = lock::read(&self.templates);
        let template = templates
            .get(service, action)
            .ok_or_else(|| ServiceError::UnknownTemplate {
                service: service.to_string(),
                action: action.to_string(),
            })?;

        let configs = lock::read(&self.configs);
        let config = configs
            .get(service)
            .ok_or_else(|| ServiceError::UnknownService(service.to_string()))?;

        let mut merged = config.default_params.clone();
        if let Some(globals) = lock::read(&self.service_params).get(service) {
            merged.extend(globals.clone());
        }
        merged.extend(params.clone());

        let global_headers = lock::read(&self.service_headers)
            .get(service)
            .cloned()
            .unwrap_or_default();

        build_request(template, config, &global_headers, &merged)
    }

    /// Sends with the configured timeout and enforces the 2xx contract.
    async fn send_checked(&self, parts: RequestParts) -> Result<Vec<u8>, ServiceError> {
        let resp = self.http.send(parts, Some(self.timeout)).await?;
        if !(200..300).contains(&resp.status) {
            return Err(ServiceError::Http(HttpError::Status {
                status: resp.status,
                body: String::from_utf8_lossy(&resp.body).into_owned(),
            }));
        }
        Ok(resp.body)
    }
}

#[async_trait]
impl ActionExecutor for ServiceCore {
    async fn execute_action(
        &self,
        service: &str,
        action: &str,
        params: ParamMap,
    ) -> Result<ParamMap, ServiceError> {
        debug!(service, action, "executing service action");
        let parts = self.prepare(service, action, &params)?;
        let body = self.send_checked(parts).await?;
        if body.is_empty() {
            return Ok(ParamMap::new());
        }
        serde_json::from_slice(&body).map_err(ServiceError::Decode)
    }
}
