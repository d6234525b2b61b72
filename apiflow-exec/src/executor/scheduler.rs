use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use apiflow_core::expressions::extract_value;
use apiflow_core::{ErrorStrategy, ParamMap, WorkflowStep};

use crate::error::WorkflowError;
use crate::executor::eval::evaluate_aggregator;
use crate::executor::loop_step::run_loop;
use crate::executor::step_runner::run_step;
use crate::executor::{StepOutcome, WorkflowExecutor, WorkflowOutcome};

/// What one parallel-group member produced.
enum MemberOutcome {
    Single(StepOutcome),
    Loop(Vec<StepOutcome>),
}

impl WorkflowExecutor {
    /// Executes a registered workflow.
    ///
    /// Steps run in declaration order. A step plus every later step whose
    /// `parallel_with` names it form a parallel group: members fan out
    /// concurrently over a snapshot of the scope, the walk joins them all,
    /// then error strategies and result mapping apply serially in declaration
    /// order, so variables written by a group are visible to later groups and
    /// never to peers.
    pub async fn execute(
        &self,
        name: &str,
        initial_params: ParamMap,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let workflow = self.lookup(name)?;
        info!(workflow = %name, steps = workflow.steps.len(), "executing workflow");

        let mut scope = Self::seed_scope(&workflow, initial_params);
        let mut executed = HashSet::<String>::new();
        let mut step_results = HashMap::<String, ParamMap>::new();

        let steps = &workflow.steps;
        for (i, step) in steps.iter().enumerate() {
            if executed.contains(&step.id) {
                continue;
            }

            let mut group = vec![step.clone()];
            for later in &steps[i + 1..] {
                if later.parallel_with.iter().any(|id| id == &step.id) {
                    executed.insert(later.id.clone());
                    group.push(later.clone());
                }
            }
            executed.insert(step.id.clone());

            let outcomes = self.run_group(&group, &scope).await?;

            for (member, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(MemberOutcome::Single(outcome)) => {
                        if outcome.skipped {
                            continue;
                        }
                        apply_result_mapping(member, &outcome, &mut scope);
                        step_results.insert(outcome.step_id.clone(), outcome.result);
                    }
                    Ok(MemberOutcome::Loop(iterations)) => {
                        collect_loop_results(member, &iterations, &mut scope);
                        for iteration in iterations {
                            if !iteration.skipped {
                                step_results
                                    .insert(iteration.step_id.clone(), iteration.result);
                            }
                        }
                    }
                    Err(error) => match member.error_handling {
                        ErrorStrategy::Continue => {
                            warn!(step_id = %member.id, %error, "step failed, continuing");
                        }
                        ErrorStrategy::Retry => {
                            return Err(WorkflowError::RetryUnsupported {
                                step_id: member.id.clone(),
                            });
                        }
                        ErrorStrategy::Abort => return Err(error),
                    },
                }
            }
        }

        let result = if workflow.aggregator.is_empty() {
            last_executed_result(steps, &mut step_results)
        } else {
            Some(aggregate(&workflow.aggregator, &scope))
        };

        Ok(WorkflowOutcome {
            variables: scope,
            result,
        })
    }

    /// Fans the group out on tasks sharing a read-only snapshot of the scope
    /// and joins them all. Loop members iterate serially inside their task,
    /// concurrently with sibling members. Outcomes come back in group
    /// (declaration) order.
    async fn run_group(
        &self,
        group: &[WorkflowStep],
        scope: &ParamMap,
    ) -> Result<Vec<Result<MemberOutcome, WorkflowError>>, WorkflowError> {
        let snapshot = Arc::new(scope.clone());
        let mut handles = Vec::with_capacity(group.len());

        for member in group {
            let member = member.clone();
            let snapshot = Arc::clone(&snapshot);
            let service = Arc::clone(&self.service);
            handles.push(tokio::spawn(async move {
                if member.is_loop() {
                    run_loop(&member, &snapshot, service.as_ref())
                        .await
                        .map(MemberOutcome::Loop)
                } else {
                    run_step(&member, &snapshot, service.as_ref())
                        .await
                        .map(MemberOutcome::Single)
                        .map_err(|source| WorkflowError::StepFailed {
                            step_id: member.id.clone(),
                            source,
                        })
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(
                handle
                    .await
                    .map_err(|e| WorkflowError::Join(e.to_string()))?,
            );
        }
        Ok(outcomes)
    }
}

/// Binds each mapped response path into the scope; an unresolvable path
/// leaves the variable unchanged and only logs.
fn apply_result_mapping(step: &WorkflowStep, outcome: &StepOutcome, scope: &mut ParamMap) {
    for (response_path, variable) in &step.result_mapping {
        match extract_value(&outcome.result, response_path) {
            Some(value) => {
                debug!(
                    step_id = %outcome.step_id,
                    path = %response_path,
                    variable = %variable,
                    "mapped result field to variable"
                );
                scope.insert(variable.clone(), value.clone());
            }
            None => {
                warn!(
                    step_id = %outcome.step_id,
                    path = %response_path,
                    "could not extract field from response"
                );
            }
        }
    }
}

/// Collects each mapped field across the loop's iterations into one array
/// variable, in source-sequence order. Iterations where the field did not
/// resolve contribute no element; a field that resolved nowhere binds
/// nothing.
fn collect_loop_results(step: &WorkflowStep, iterations: &[StepOutcome], scope: &mut ParamMap) {
    for (response_path, variable) in &step.result_mapping {
        let collected: Vec<JsonValue> = iterations
            .iter()
            .filter(|o| !o.skipped)
            .filter_map(|o| extract_value(&o.result, response_path).cloned())
            .collect();
        if !collected.is_empty() {
            debug!(
                step_id = %step.id,
                variable = %variable,
                count = collected.len(),
                "collected loop results"
            );
            scope.insert(variable.clone(), JsonValue::Array(collected));
        }
    }
}

fn aggregate(
    aggregator: &std::collections::BTreeMap<String, String>,
    scope: &ParamMap,
) -> JsonValue {
    let mut aggregated = ParamMap::new();
    for (field, expression) in aggregator {
        match evaluate_aggregator(expression, scope) {
            Ok(value) => {
                aggregated.insert(field.clone(), value);
            }
            Err(message) => {
                warn!(%field, %expression, %message, "error evaluating aggregator expression");
            }
        }
    }
    JsonValue::Object(aggregated)
}

/// The raw response of the last declared step that actually ran. Loop
/// iterations record under synthesized `id[i]` ids, so a trailing loop step
/// yields no fallback result.
fn last_executed_result(
    steps: &[WorkflowStep],
    step_results: &mut HashMap<String, ParamMap>,
) -> Option<JsonValue> {
    steps
        .iter()
        .rev()
        .find_map(|s| step_results.remove(&s.id).map(JsonValue::Object))
}
