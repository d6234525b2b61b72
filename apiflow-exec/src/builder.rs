//! Fluent construction of a configured [`ApiService`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use apiflow_core::template::placeholder_name;
use apiflow_core::{
    ConditionKind, ErrorStrategy, ParamMap, RouteTemplate, ServiceConfig, StepCondition, Workflow,
    WorkflowStep,
};

use crate::client::{HttpClient, ReqwestHttpClient, StreamingClient, StreamingTransport};
use crate::error::WorkflowError;
use crate::service::{ApiService, DEFAULT_TIMEOUT};

/// Builder for an [`ApiService`]: services, templates, headers, parameters,
/// and workflows declared up front, clients injectable for tests.
pub struct ServiceBuilder {
    configs: BTreeMap<String, ServiceConfig>,
    templates: Vec<(String, String, RouteTemplate)>,
    headers: BTreeMap<String, BTreeMap<String, String>>,
    params: BTreeMap<String, ParamMap>,
    workflows: Vec<Workflow>,
    timeout: Duration,
    http: Option<Arc<dyn HttpClient>>,
    streaming: Option<Arc<dyn StreamingTransport>>,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            configs: BTreeMap::new(),
            templates: Vec::new(),
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            workflows: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            http: None,
            streaming: None,
        }
    }

    /// Timeout applied to every unary request. Streaming requests never time
    /// out.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.configs
            .insert(name.into(), ServiceConfig::new(base_url));
        self
    }

    pub fn with_service_token(mut self, name: &str, token: impl Into<String>) -> Self {
        self.configs
            .entry(name.to_string())
            .or_default()
            .token = Some(token.into());
        self
    }

    pub fn with_service_default_params(mut self, name: &str, params: ParamMap) -> Self {
        self.configs
            .entry(name.to_string())
            .or_default()
            .default_params
            .extend(params);
        self
    }

    pub fn with_service_headers(
        mut self,
        name: &str,
        headers: BTreeMap<String, String>,
    ) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .extend(headers);
        self
    }

    pub fn with_service_params(mut self, name: &str, params: ParamMap) -> Self {
        self.params
            .entry(name.to_string())
            .or_default()
            .extend(params);
        self
    }

    pub fn with_template(mut self, service: &str, action: &str, template: RouteTemplate) -> Self {
        self.templates
            .push((service.to_string(), action.to_string(), template));
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    pub fn with_streaming_transport(mut self, transport: Arc<dyn StreamingTransport>) -> Self {
        self.streaming = Some(transport);
        self
    }

    /// Starts a workflow definition; finish it with [`WorkflowBuilder::build`]
    /// to come back to this builder.
    pub fn with_workflow(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> WorkflowBuilder {
        WorkflowBuilder {
            service_builder: self,
            workflow: Workflow::new(name, description),
        }
    }

    /// Assembles the service. Fails if a declared workflow does not pass
    /// registration validation.
    pub fn build(self) -> Result<ApiService, WorkflowError> {
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let streaming = match self.streaming {
            Some(transport) => StreamingClient::with_transport(transport),
            None => StreamingClient::new(),
        };

        let service = ApiService::with_clients(http, streaming, self.timeout);

        for (name, config) in self.configs {
            service.set_service_config(&name, config);
        }
        for (svc, action, template) in self.templates {
            service.add_route_template(&svc, &action, template);
        }
        for (name, headers) in self.headers {
            service.set_service_headers(&name, headers);
        }
        for (name, params) in self.params {
            service.set_service_params(&name, params);
        }
        for workflow in self.workflows {
            service.register_workflow(workflow)?;
        }

        Ok(service)
    }
}

/// Accumulates one workflow inside a [`ServiceBuilder`] chain.
pub struct WorkflowBuilder {
    service_builder: ServiceBuilder,
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.workflow.steps.push(step);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.workflow.variables.insert(name.into(), value);
        self
    }

    pub fn with_aggregator(
        mut self,
        field: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.workflow
            .aggregator
            .insert(field.into(), expression.into());
        self
    }

    pub fn build(mut self) -> ServiceBuilder {
        self.service_builder.workflows.push(self.workflow);
        self.service_builder
    }
}

/// Fluent construction of one [`WorkflowStep`].
pub struct WorkflowStepBuilder {
    step: WorkflowStep,
}

impl WorkflowStepBuilder {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        service_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        let mut step = WorkflowStep::new(id, service_name, action_name);
        step.description = description.into();
        Self { step }
    }

    /// Adds a parameter. A string value that is exactly `{{variable}}` is
    /// routed to the dynamic parameters instead, bound from the scope at
    /// execution time.
    pub fn with_param(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        if let JsonValue::String(s) = &value {
            if let Some((variable, _)) = placeholder_name(s) {
                self.step
                    .dynamic_params
                    .insert(name.into(), variable.to_string());
                return self;
            }
        }
        self.step.parameters.insert(name.into(), value);
        self
    }

    pub fn with_dynamic_param(
        mut self,
        name: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.step.dynamic_params.insert(name.into(), variable.into());
        self
    }

    pub fn with_result_map(
        mut self,
        response_path: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.step
            .result_mapping
            .insert(response_path.into(), variable.into());
        self
    }

    pub fn with_condition(
        mut self,
        kind: ConditionKind,
        source_variable: impl Into<String>,
        value: JsonValue,
    ) -> Self {
        self.step.condition = Some(StepCondition::new(kind, source_variable).with_value(value));
        self
    }

    pub fn with_parallel(mut self, step_ids: &[&str]) -> Self {
        self.step
            .parallel_with
            .extend(step_ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn with_error_handling(mut self, strategy: ErrorStrategy, max_retries: u32) -> Self {
        self.step.error_handling = strategy;
        self.step.max_retries = max_retries;
        self
    }

    pub fn with_loop(mut self, over: impl Into<String>, bind_as: impl Into<String>) -> Self {
        self.step.loop_over = over.into();
        self.step.loop_as = bind_as.into();
        self
    }

    pub fn build(self) -> WorkflowStep {
        self.step
    }
}
