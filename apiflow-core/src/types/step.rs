use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::types::ParamMap;

/// How a step condition compares its source variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Variable present and non-null.
    Exists,
    /// Deep equality with the condition value.
    Equals,
    /// Substring, sequence element, or mapping key.
    Contains,
    GreaterThan,
    LessThan,
}

/// A gate evaluated against the variable scope before a step runs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StepCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,

    pub source_variable: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl StepCondition {
    pub fn new(kind: ConditionKind, source_variable: impl Into<String>) -> Self {
        Self {
            kind,
            source_variable: source_variable.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: JsonValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// What a failing step does to the rest of the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Log the failure, skip the step's result mapping, keep going.
    Continue,
    /// Terminate the workflow with the step's error.
    #[default]
    Abort,
    /// Declared but not implemented; surfaced as an error when exercised.
    Retry,
}

fn is_abort(strategy: &ErrorStrategy) -> bool {
    *strategy == ErrorStrategy::Abort
}

fn is_zero_u32(n: &u32) -> bool {
    *n == 0
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

/// One invocation within a workflow.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow.
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub service_name: String,

    pub action_name: String,

    /// Fixed parameters; string values containing `{{...}}` are evaluated as
    /// expressions against the scope at execution time.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub parameters: ParamMap,

    /// Target parameter name -> source variable name or expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dynamic_params: BTreeMap<String, String>,

    /// Dotted response path -> variable name bound after the step succeeds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub result_mapping: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,

    /// Ids of earlier steps this step joins as a parallel peer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel_with: Vec<String>,

    #[serde(default, skip_serializing_if = "is_abort")]
    pub error_handling: ErrorStrategy,

    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub retry_delay_ms: u64,

    /// Variable holding the array this step iterates over.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loop_over: String,

    /// Name the iteration element is bound to inside the step's scope; the
    /// index is bound alongside as `<loop_as>_index`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loop_as: String,
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        service_name: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            action_name: action_name.into(),
            ..Self::default()
        }
    }

    pub fn is_loop(&self) -> bool {
        !self.loop_over.is_empty()
    }
}
