use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use apiflow_core::ParamMap;

/// What an executed workflow hands back: the final variable scope and the
/// caller-facing result (aggregated mapping, or the last executed step's raw
/// response when no aggregator is defined; `None` when neither exists).
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutcome {
    pub variables: ParamMap,
    pub result: Option<JsonValue>,
}

impl WorkflowOutcome {
    /// JSON round-trips the result into the caller's type.
    pub fn decode_into<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.result
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }
}

/// One step's (or one loop iteration's) completed execution.
#[derive(Debug, Clone)]
pub(crate) struct StepOutcome {
    pub step_id: String,
    /// Condition evaluated to false; the step did not run and its result
    /// mapping is not applied.
    pub skipped: bool,
    pub result: ParamMap,
}
