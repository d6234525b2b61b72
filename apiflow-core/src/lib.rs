#![forbid(unsafe_code)]

//! Core data model for the apiflow client: route templates with `{{name}}`
//! placeholders, the substitution rules that bind them, and the workflow
//! definitions the runtime in `apiflow-exec` executes.

pub mod error;
pub mod expressions;
pub mod template;
pub mod types;
pub mod validate;

pub use crate::error::{PersistError, ValidationError, Violation};
pub use crate::template::{RouteTemplate, TemplateStore};
pub use crate::types::{
    ConditionKind, ErrorStrategy, ParamMap, ServiceConfig, StepCondition, Workflow, WorkflowStep,
};
pub use crate::validate::validate_workflow;
