use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use apiflow_core::{ParamMap, WorkflowStep};

use crate::error::StepError;
use crate::executor::conditions::evaluate_condition;
use crate::executor::eval::{evaluate_expression, is_expression};
use crate::executor::{ActionExecutor, StepOutcome};

/// Runs one step against a read-only snapshot of the variable scope.
///
/// The condition gate, parameter assembly, and the HTTP call happen here; the
/// scheduler applies result mapping serially after the step's whole parallel
/// group joins.
pub(crate) async fn run_step(
    step: &WorkflowStep,
    scope: &ParamMap,
    service: &dyn ActionExecutor,
) -> Result<StepOutcome, StepError> {
    if let Some(condition) = &step.condition {
        let met = evaluate_condition(condition, scope).map_err(StepError::Condition)?;
        if !met {
            debug!(step_id = %step.id, "condition not met, skipping step");
            return Ok(StepOutcome {
                step_id: step.id.clone(),
                skipped: true,
                result: ParamMap::new(),
            });
        }
    }

    let params = build_step_params(step, scope)?;
    let result = service
        .execute_action(&step.service_name, &step.action_name, params)
        .await?;

    Ok(StepOutcome {
        step_id: step.id.clone(),
        skipped: false,
        result,
    })
}

/// Assembles the outgoing parameter map: fixed parameters (strings holding
/// `{{...}}` are evaluated as expressions) plus dynamic parameters bound from
/// scope variables or expressions. A missing dynamic source variable is a
/// warning and the parameter is simply absent.
fn build_step_params(step: &WorkflowStep, scope: &ParamMap) -> Result<ParamMap, StepError> {
    let mut params = ParamMap::new();

    for (name, value) in &step.parameters {
        match value {
            JsonValue::String(s) if is_expression(s) => {
                let evaluated =
                    evaluate_expression(s, scope).map_err(|message| StepError::Expression {
                        name: name.clone(),
                        message,
                    })?;
                debug!(step_id = %step.id, parameter = %name, "evaluated fixed parameter expression");
                params.insert(name.clone(), evaluated);
            }
            _ => {
                params.insert(name.clone(), value.clone());
            }
        }
    }

    for (name, source) in &step.dynamic_params {
        if is_expression(source) {
            let evaluated =
                evaluate_expression(source, scope).map_err(|message| StepError::Expression {
                    name: name.clone(),
                    message,
                })?;
            debug!(step_id = %step.id, parameter = %name, "evaluated dynamic parameter expression");
            params.insert(name.clone(), evaluated);
        } else if let Some(value) = scope.get(source) {
            params.insert(name.clone(), value.clone());
        } else {
            warn!(
                step_id = %step.id,
                parameter = %name,
                variable = %source,
                "variable not found for dynamic parameter"
            );
        }
    }

    Ok(params)
}
