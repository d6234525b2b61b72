pub mod conditions;
pub mod eval;
mod loop_step;
mod outcome;
mod registry;
mod scheduler;
mod step_runner;

use async_trait::async_trait;

use apiflow_core::ParamMap;

use crate::error::ServiceError;

pub use outcome::WorkflowOutcome;
pub use registry::WorkflowExecutor;

pub(crate) use outcome::StepOutcome;

/// The collaborator the executor drives: binds one (service, action) call and
/// returns the decoded response mapping. Implemented by the service facade;
/// tests substitute mocks.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute_action(
        &self,
        service: &str,
        action: &str,
        params: ParamMap,
    ) -> Result<ParamMap, ServiceError>;
}
