use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use apiflow_core::{ErrorStrategy, ParamMap, WorkflowStep};

use crate::error::WorkflowError;
use crate::executor::step_runner::run_step;
use crate::executor::{ActionExecutor, StepOutcome};

/// Runs a looped step: one execution per element of the array held by
/// `loop_over`, serially, each against a scope clone carrying the element as
/// `loop_as` and its index as `<loop_as>_index`.
///
/// Iterations are tracked under synthesized ids `"<id>[<i>]"`. Outcomes keep
/// source order, which is what makes the collected result arrays ordered.
pub(crate) async fn run_loop(
    step: &WorkflowStep,
    scope: &ParamMap,
    service: &dyn ActionExecutor,
) -> Result<Vec<StepOutcome>, WorkflowError> {
    let source = scope
        .get(&step.loop_over)
        .ok_or_else(|| WorkflowError::LoopSourceMissing {
            variable: step.loop_over.clone(),
        })?;
    let JsonValue::Array(items) = source else {
        return Err(WorkflowError::LoopSourceNotArray {
            variable: step.loop_over.clone(),
        });
    };

    if items.is_empty() {
        debug!(step_id = %step.id, variable = %step.loop_over, "loop source is empty, skipping");
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let mut iteration_scope = scope.clone();
        iteration_scope.insert(step.loop_as.clone(), item.clone());
        iteration_scope.insert(format!("{}_index", step.loop_as), JsonValue::from(index));

        let mut iteration_step = step.clone();
        iteration_step.id = format!("{}[{}]", step.id, index);

        match run_step(&iteration_step, &iteration_scope, service).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(source) => match step.error_handling {
                ErrorStrategy::Continue => {
                    warn!(step_id = %step.id, index, error = %source, "loop iteration failed, continuing");
                }
                ErrorStrategy::Retry => {
                    return Err(WorkflowError::RetryUnsupported {
                        step_id: step.id.clone(),
                    });
                }
                ErrorStrategy::Abort => {
                    return Err(WorkflowError::LoopIteration {
                        step_id: step.id.clone(),
                        index,
                        source,
                    });
                }
            },
        }
    }

    Ok(outcomes)
}
