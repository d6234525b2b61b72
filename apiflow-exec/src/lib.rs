#![forbid(unsafe_code)]

//! Runtime engine for apiflow: binds route templates to concrete HTTP
//! requests, issues them over a pluggable transport, and executes registered
//! workflows (sequential, parallel, conditional, and looped steps over a
//! shared variable scope).

pub mod builder;
pub mod client;
pub mod error;
pub mod executor;
mod lock;
pub mod service;

pub use crate::builder::{ServiceBuilder, WorkflowBuilder, WorkflowStepBuilder};
pub use crate::client::{
    ChunkStream, HttpClient, HttpError, ReqwestHttpClient, ReqwestStreamingTransport,
    ResponseParts, StreamWriter, StreamingClient, StreamingReply, StreamingTransport,
};
pub use crate::error::{ServiceError, StepError, WorkflowError};
pub use crate::executor::{ActionExecutor, WorkflowExecutor, WorkflowOutcome};
pub use crate::service::{ApiService, RequestParts};
