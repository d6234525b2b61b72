mod route;
mod service;
mod step;
mod workflow;

pub use route::RouteTemplate;
pub use service::ServiceConfig;
pub use step::{ConditionKind, ErrorStrategy, StepCondition, WorkflowStep};
pub use workflow::Workflow;

/// A dynamic parameter bag: name -> JSON value.
///
/// Used for call parameters, template bodies, query maps, and the per-run
/// workflow variable scope.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;
