use thiserror::Error;

use apiflow_core::{PersistError, ValidationError};

use crate::client::HttpError;

/// Failures preparing or issuing a single request.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no configuration found for service: {0}")]
    UnknownService(String),

    #[error("no template found for action: {action} in service {service}")]
    UnknownTemplate { service: String, action: String },

    #[error("missing required path parameter: {0}")]
    MissingPathParam(String),

    #[error("missing required query parameter: {0}")]
    MissingQueryParam(String),

    #[error("missing required body parameter for key: {0}")]
    MissingBodyParam(String),

    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid template id {0}, must be in format 'service.action'")]
    InvalidTemplateId(String),

    #[error("failed to encode request body: {0}")]
    EncodeBody(#[source] serde_json::Error),

    #[error("failed to make request: {0}")]
    Http(#[from] HttpError),

    #[error("cannot decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Failures of one workflow step, before or during its HTTP call.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("error evaluating condition: {0}")]
    Condition(String),

    #[error("error evaluating expression for parameter {name}: {message}")]
    Expression { name: String, message: String },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Failures of a workflow execution as a whole.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("workflow step {step_id} failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: StepError,
    },

    #[error("loop variable '{variable}' not found in workflow variables")]
    LoopSourceMissing { variable: String },

    #[error("loop variable '{variable}' is not an array")]
    LoopSourceNotArray { variable: String },

    #[error("workflow loop step {step_id} failed: iteration {index}: {source}")]
    LoopIteration {
        step_id: String,
        index: usize,
        #[source]
        source: StepError,
    },

    #[error("retry strategy not implemented for step {step_id}")]
    RetryUnsupported { step_id: String },

    #[error("step task failed to join: {0}")]
    Join(String),
}
