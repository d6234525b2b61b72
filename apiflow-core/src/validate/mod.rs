use std::collections::HashSet;

use crate::error::{ValidationError, Violation};
use crate::types::Workflow;

/// Checks a workflow against the registration invariants.
///
/// Rules: the workflow is named; every step has a unique non-empty id and
/// names both a service and an action; `parallel_with` only references steps
/// declared earlier.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    let mut v = Validator::new();

    if workflow.name.is_empty() {
        v.push("name", "workflow must have a name");
    }

    let mut step_ids = HashSet::<&str>::new();
    for (idx, step) in workflow.steps.iter().enumerate() {
        let spath = format!("steps[{idx}]");

        if step.id.is_empty() {
            v.push(format!("{spath}.id"), "step must have an id");
        } else if !step_ids.insert(step.id.as_str()) {
            v.push(
                format!("{spath}.id"),
                format!("duplicate step id {}", step.id),
            );
        }

        if step.service_name.is_empty() || step.action_name.is_empty() {
            v.push(
                format!("{spath}"),
                "step must have a service name and action name",
            );
        }

        for parallel_id in &step.parallel_with {
            if !step_ids.contains(parallel_id.as_str()) {
                v.push(
                    format!("{spath}.parallel_with"),
                    format!("references unknown parallel step id {parallel_id}"),
                );
            }
        }
    }

    v.finish()
}

struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }
}
