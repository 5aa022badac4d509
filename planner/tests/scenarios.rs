//! End-to-end planning and execution scenarios against an in-memory catalog
//! and a scripted oracle.

use serde_json::{Value, json};

use planner::core::types::{ParamValue, PlanStatus};
use planner::core::validate::{RawPlan, validate_and_enhance};
use planner::error::ExecutionError;
use planner::execute::PlanExecutor;
use planner::io::retry::RetryPolicy;
use planner::synthesize::{PlanSynthesizer, SynthesizerSettings};
use planner::test_support::{
    INVOICE_REQUEST, ScriptedOracle, invoice_catalog, invoice_plan, invoice_plan_json, plan_of,
    recording_catalog, step,
};

const NO_CONFIRMATIONS: &[&str] = &[];

fn settings() -> SynthesizerSettings {
    SynthesizerSettings {
        retry: RetryPolicy::none(),
        ..SynthesizerSettings::default()
    }
}

#[test]
fn invoice_request_plans_two_steps_with_one_confirmation() {
    let (catalog, _) = invoice_catalog();
    let oracle = ScriptedOracle::replying(invoice_plan_json());

    let result = PlanSynthesizer::new(&catalog, &oracle, settings())
        .generate_execution_plan(INVOICE_REQUEST)
        .expect("plan");

    assert_eq!(result.status, PlanStatus::RequiresConfirmation);
    assert_eq!(result.plan.steps.len(), 2);
    assert_eq!(result.plan.steps[1].dependencies, vec!["step_1"]);
    assert!(result.plan.steps[1].requires_user_confirmation);
    assert_eq!(result.confirmations_needed.len(), 1);
}

#[test]
fn unconfirmed_invoice_stops_after_search() {
    let (catalog, recorder) = invoice_catalog();

    let err = PlanExecutor::new(&catalog)
        .execute_plan(&invoice_plan(), NO_CONFIRMATIONS, &Value::Null)
        .expect_err("missing confirmation");

    assert!(matches!(err, ExecutionError::MissingConfirmation { ref step_id } if step_id == "step_2"));
    assert_eq!(recorder.tools(), vec!["global_search"]);
}

#[test]
fn confirmed_invoice_runs_both_steps_in_order() {
    let (catalog, recorder) = invoice_catalog();

    let results = PlanExecutor::new(&catalog)
        .execute_plan(&invoice_plan(), &["step_2"], &json!({"user_id": "u1"}))
        .expect("execute");

    assert_eq!(recorder.tools(), vec!["global_search", "create_invoice"]);
    assert_eq!(results.len(), 2);
    assert_eq!(results.step_ids().collect::<Vec<_>>(), vec!["step_1", "step_2"]);
    assert_eq!(
        results.get("step_2"),
        Some(&json!({"invoice_id": "inv_1", "status": "sent"}))
    );

    let invoice_call = &recorder.calls()[1];
    assert_eq!(invoice_call.parameters["client_id"], json!("c1"));
    assert_eq!(invoice_call.parameters["amount"], json!(295));
    assert_eq!(invoice_call.caller, json!({"user_id": "u1"}));
}

#[test]
fn unknown_tool_fails_before_any_invocation() {
    let (catalog, recorder) = invoice_catalog();
    let plan = plan_of(vec![
        step("step_1", "nonexistent_tool"),
        step("step_2", "global_search"),
    ]);

    let err = PlanExecutor::new(&catalog)
        .execute_plan(&plan, NO_CONFIRMATIONS, &Value::Null)
        .expect_err("unknown tool");

    assert!(matches!(
        err,
        ExecutionError::ToolNotFound { ref step_id, ref tool }
            if step_id == "step_1" && tool == "nonexistent_tool"
    ));
    assert!(recorder.calls().is_empty());
}

#[test]
fn dependency_declared_later_aborts_at_dependent() {
    let (catalog, recorder) = recording_catalog(&[("t", json!({}))]);
    let mut b = step("b", "t");
    b.dependencies = vec!["a".to_string()];
    let plan = plan_of(vec![b, step("a", "t")]);

    let err = PlanExecutor::new(&catalog)
        .execute_plan(&plan, NO_CONFIRMATIONS, &Value::Null)
        .expect_err("unsatisfied");

    assert!(matches!(
        err,
        ExecutionError::UnsatisfiedDependency { ref step_id, ref dependency }
            if step_id == "b" && dependency == "a"
    ));
    assert!(recorder.calls().is_empty());
}

#[test]
fn catalog_listing_is_stable() {
    let (catalog, _) = invoice_catalog();
    assert_eq!(catalog.listing(), catalog.listing());
}

#[test]
fn malformed_raw_plans_always_validate() {
    let inputs = [
        json!({}),
        json!({"goal": null, "steps": null}),
        json!({"goal": 5, "steps": {"id": "x"}, "complexity": "extreme"}),
        json!({"steps": [null, 3, "x", {"tool": 7, "dependencies": "a"}]}),
        json!({"user_confirmations_required": "two", "total_estimated_duration": ""}),
    ];
    for input in inputs {
        let Value::Object(object) = input else {
            unreachable!("inputs are objects")
        };
        let plan = validate_and_enhance(&RawPlan::from_object(object));
        assert!(!plan.goal.is_empty());
        assert!(!plan.total_estimated_duration.is_empty());
        for (idx, step) in plan.steps.iter().enumerate() {
            assert!(!step.id.is_empty(), "step {idx} has an id");
        }
    }
}

#[test]
fn confirmation_set_matches_flags_not_advisory_count() {
    let raw = RawPlan::parse(
        &json!({
            "steps": [
                {"id": "a", "tool": "t", "requires_user_confirmation": true},
                {"id": "b", "tool": "t", "requires_user_confirmation": "yes"},
                {"id": "c", "tool": "t"}
            ],
            "user_confirmations_required": 3
        })
        .to_string(),
    )
    .expect("parse");

    let result = planner::core::types::PlanningResult::from_plan(validate_and_enhance(&raw));
    let ids: Vec<&str> = result
        .confirmations_needed
        .iter()
        .map(|step| step.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a"]);
}

#[test]
fn failing_dependency_stops_the_chain() {
    let (catalog, recorder) = recording_catalog(&[("t", json!({}))]);
    let mut b = step("b", "t");
    b.dependencies = vec!["a".to_string()];
    let plan = plan_of(vec![step("a", "missing"), b, step("c", "t")]);

    let err = PlanExecutor::new(&catalog)
        .execute_plan(&plan, NO_CONFIRMATIONS, &Value::Null)
        .expect_err("a fails");

    assert_eq!(err.step_id(), "a");
    assert!(recorder.calls().is_empty());

    let plan = plan_of(vec![
        {
            let mut b = step("b", "t");
            b.dependencies = vec!["a".to_string()];
            b
        },
        step("c", "t"),
    ]);
    let err = PlanExecutor::new(&catalog)
        .execute_plan(&plan, NO_CONFIRMATIONS, &Value::Null)
        .expect_err("a removed");
    assert!(matches!(err, ExecutionError::UnsatisfiedDependency { ref step_id, .. } if step_id == "b"));
    assert!(recorder.calls().is_empty());
}

#[test]
fn step_output_reference_substitutes_client_id() {
    let (catalog, recorder) = recording_catalog(&[
        ("search", json!({"clients": [{"id": "c1"}]})),
        ("invoice", json!({"ok": true})),
    ]);
    let mut b = step("B", "invoice");
    b.parameters
        .insert("client_id".to_string(), ParamValue::step_output("A"));
    let plan = plan_of(vec![step("A", "search"), b]);

    PlanExecutor::new(&catalog)
        .execute_plan(&plan, NO_CONFIRMATIONS, &Value::Null)
        .expect("execute");

    assert_eq!(recorder.calls()[1].parameters["client_id"], json!("c1"));
}
