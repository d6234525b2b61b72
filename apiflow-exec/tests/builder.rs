use serde_json::json;

use apiflow_core::{ConditionKind, ErrorStrategy};
use apiflow_exec::{ServiceBuilder, WorkflowStepBuilder};

#[test]
fn step_builder_routes_placeholder_params_to_dynamic() {
    let step = WorkflowStepBuilder::new("geocode", "Get location", "location", "geocode")
        .with_param("address", json!("{{address}}"))
        .with_param("limit", json!(5))
        .with_dynamic_param("session", "session_id")
        .with_result_map("latitude", "lat")
        .with_condition(ConditionKind::Equals, "enabled", json!(true))
        .with_error_handling(ErrorStrategy::Continue, 2)
        .build();

    assert_eq!(step.id, "geocode");
    assert_eq!(step.description, "Get location");
    // Whole-string placeholder became a dynamic binding, not a fixed value.
    assert_eq!(step.dynamic_params.get("address").map(String::as_str), Some("address"));
    assert!(!step.parameters.contains_key("address"));
    assert_eq!(step.parameters.get("limit"), Some(&json!(5)));
    assert_eq!(step.dynamic_params.get("session").map(String::as_str), Some("session_id"));
    assert_eq!(step.result_mapping.get("latitude").map(String::as_str), Some("lat"));
    assert_eq!(step.error_handling, ErrorStrategy::Continue);
    assert_eq!(step.max_retries, 2);

    let condition = step.condition.unwrap();
    assert_eq!(condition.kind, ConditionKind::Equals);
    assert_eq!(condition.source_variable, "enabled");
    assert_eq!(condition.value, Some(json!(true)));
}

#[test]
fn step_builder_configures_loops_and_parallelism() {
    let step = WorkflowStepBuilder::new("details", "", "items", "getDetails")
        .with_loop("item_ids", "current_item")
        .with_parallel(&["fetch", "audit"])
        .build();

    assert!(step.is_loop());
    assert_eq!(step.loop_over, "item_ids");
    assert_eq!(step.loop_as, "current_item");
    assert_eq!(step.parallel_with, vec!["fetch", "audit"]);
}

#[test]
fn builder_registers_declared_workflows() {
    let service = ServiceBuilder::new()
        .with_service("location", "http://geo.test")
        .with_workflow("lookup", "Address lookup")
        .with_variable("country", json!("US"))
        .with_step(
            WorkflowStepBuilder::new("geocode", "", "location", "geocode")
                .with_param("address", json!("{{address}}"))
                .build(),
        )
        .with_aggregator("country", "country")
        .build()
        .build()
        .unwrap();

    let workflow = service.get_workflow("lookup").unwrap();
    assert_eq!(workflow.description, "Address lookup");
    assert_eq!(workflow.steps.len(), 1);
    assert_eq!(workflow.variables.get("country"), Some(&json!("US")));
    assert_eq!(service.list_workflows(), vec!["lookup".to_string()]);
}

#[test]
fn builder_rejects_invalid_workflows() {
    let result = ServiceBuilder::new()
        .with_workflow("bad", "")
        .with_step(WorkflowStepBuilder::new("a", "", "svc", "act").build())
        .with_step(WorkflowStepBuilder::new("a", "", "svc", "act").build())
        .build()
        .build();

    assert!(result.is_err());
}
