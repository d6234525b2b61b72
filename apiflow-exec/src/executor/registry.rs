use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::info;

use apiflow_core::{validate_workflow, ParamMap, PersistError, Workflow, WorkflowStep};

use crate::error::WorkflowError;
use crate::executor::ActionExecutor;
use crate::lock;

/// Registry of named workflows plus the engine that executes them.
///
/// Workflows are validated on registration and shared read-only across
/// concurrent executions; each execution owns its own variable scope.
pub struct WorkflowExecutor {
    pub(crate) service: Arc<dyn ActionExecutor>,
    workflows: RwLock<BTreeMap<String, Workflow>>,
}

impl WorkflowExecutor {
    pub fn new(service: Arc<dyn ActionExecutor>) -> Self {
        Self {
            service,
            workflows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, workflow: Workflow) -> Result<(), WorkflowError> {
        validate_workflow(&workflow)?;
        info!(workflow = %workflow.name, steps = workflow.steps.len(), "registered workflow");
        lock::write(&self.workflows).insert(workflow.name.clone(), workflow);
        Ok(())
    }

    /// Appends a step to an existing workflow, or registers a new single-step
    /// workflow under `name` when none exists. Re-validates either way.
    pub fn add_step(&self, name: &str, step: WorkflowStep) -> Result<(), WorkflowError> {
        match self.get(name) {
            Some(mut workflow) => {
                workflow.steps.push(step);
                self.register(workflow)
            }
            None => self.register(Workflow {
                name: name.to_string(),
                steps: vec![step],
                ..Workflow::default()
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Workflow> {
        lock::read(&self.workflows).get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        lock::read(&self.workflows).keys().cloned().collect()
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Workflow, WorkflowError> {
        self.get(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }

    /// Writes every workflow as `{ "<name>": {...} }`, pretty-printed.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
        let path = path.as_ref();
        let data = {
            let workflows = lock::read(&self.workflows);
            serde_json::to_string_pretty(&*workflows).map_err(PersistError::Encode)?
        };
        std::fs::write(path, data).map_err(|source| {
            WorkflowError::Persist(PersistError::Write {
                path: path.display().to_string(),
                source,
            })
        })
    }

    /// Loads workflows from a JSON file, registering (and re-validating)
    /// each; an invalid stored workflow aborts the load.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| {
            WorkflowError::Persist(PersistError::Read {
                path: path.display().to_string(),
                source,
            })
        })?;
        let workflows: BTreeMap<String, Workflow> =
            serde_json::from_str(&data).map_err(|source| {
                WorkflowError::Persist(PersistError::Parse {
                    path: path.display().to_string(),
                    source,
                })
            })?;

        for (_, workflow) in workflows {
            self.register(workflow)?;
        }
        Ok(())
    }

    /// Seeds a fresh scope for one execution: workflow defaults overlaid with
    /// the caller's initial parameters.
    pub(crate) fn seed_scope(workflow: &Workflow, initial_params: ParamMap) -> ParamMap {
        let mut scope = workflow.variables.clone();
        scope.extend(initial_params);
        scope
    }
}
