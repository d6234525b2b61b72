use std::collections::BTreeMap;

use crate::types::{ParamMap, WorkflowStep};

/// A named, ordered collection of steps sharing one variable scope.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    /// Default variables, overridden by the initial call parameters.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub variables: ParamMap,

    /// Output field -> expression assembling the caller-visible result from
    /// the final scope. When empty, the last executed step's raw response is
    /// the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregator: BTreeMap<String, String>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_aggregator(
        mut self,
        field: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.aggregator.insert(field.into(), expression.into());
        self
    }
}
