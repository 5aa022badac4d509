//! Test-only helpers: plan builders, a recording catalog, and a scripted oracle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value, json};

use crate::catalog::{ToolCatalog, ToolContext};
use crate::core::types::{Complexity, ExecutionPlan, PlanStep, RiskLevel};
use crate::core::validate::{RawPlan, validate_and_enhance};
use crate::error::OracleError;
use crate::io::oracle::{CompletionRequest, PlanOracle};

/// The request used throughout the invoice scenarios.
pub const INVOICE_REQUEST: &str = "Find Simon Parrott and send him an invoice for €295";

/// Create a deterministic step with no parameters or dependencies.
pub fn step(id: &str, tool: &str) -> PlanStep {
    PlanStep {
        id: id.to_string(),
        action: format!("{id} action"),
        tool: tool.to_string(),
        parameters: Default::default(),
        dependencies: Vec::new(),
        reasoning: format!("{id} reasoning"),
        estimated_duration: "1 second".to_string(),
        risk_level: RiskLevel::Low,
        requires_user_confirmation: false,
    }
}

/// Create a `noop` step depending on `dependencies`.
pub fn step_after(id: &str, dependencies: &[&str]) -> PlanStep {
    PlanStep {
        dependencies: dependencies.iter().map(|dep| dep.to_string()).collect(),
        ..step(id, "noop")
    }
}

/// Wrap steps in a plan with deterministic metadata.
pub fn plan_of(steps: Vec<PlanStep>) -> ExecutionPlan {
    ExecutionPlan {
        goal: "test goal".to_string(),
        steps,
        total_estimated_duration: "1 minute".to_string(),
        complexity: Complexity::Simple,
        user_confirmations_required: 0,
    }
}

/// Oracle completion for [`INVOICE_REQUEST`].
pub fn invoice_plan_json() -> String {
    json!({
        "goal": "Invoice Simon Parrott for €295",
        "steps": [
            {
                "id": "step_1",
                "action": "Find the client Simon Parrott",
                "tool": "global_search",
                "parameters": {"query": "Simon Parrott", "types": ["clients"]},
                "dependencies": [],
                "reasoning": "The invoice needs the client's id",
                "estimated_duration": "2 seconds",
                "risk_level": "low",
                "requires_user_confirmation": false
            },
            {
                "id": "step_2",
                "action": "Create and send a €295 invoice",
                "tool": "create_invoice",
                "parameters": {"client_id": "from_step_step_1", "amount": 295, "currency": "EUR"},
                "dependencies": ["step_1"],
                "reasoning": "Bills the client found in step_1",
                "estimated_duration": "5 seconds",
                "risk_level": "high",
                "requires_user_confirmation": true
            }
        ],
        "total_estimated_duration": "7 seconds",
        "complexity": "simple",
        "user_confirmations_required": 1
    })
    .to_string()
}

/// The validated form of [`invoice_plan_json`].
pub fn invoice_plan() -> ExecutionPlan {
    let raw = RawPlan::parse(&invoice_plan_json()).expect("invoice plan fixture parses");
    validate_and_enhance(&raw)
}

/// One observed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub step_id: String,
    pub tool: String,
    pub parameters: Map<String, Value>,
    pub caller: Value,
}

/// Shared log of invocations made through a recording catalog.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tool names in invocation order.
    pub fn tools(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.tool).collect()
    }

    fn record(&self, parameters: &Map<String, Value>, ctx: &ToolContext<'_>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                step_id: ctx.step_id.to_string(),
                tool: ctx.tool.to_string(),
                parameters: parameters.clone(),
                caller: ctx.caller.clone(),
            });
    }
}

/// Catalog whose tools record each call and return a fixed output.
pub fn recording_catalog(tools: &[(&str, Value)]) -> (ToolCatalog, Recorder) {
    let recorder = Recorder::default();
    let mut catalog = ToolCatalog::new();
    for (name, output) in tools {
        let recorder = recorder.clone();
        let output = output.clone();
        catalog.register_fn(
            *name,
            format!("{name} test tool"),
            move |parameters: &Map<String, Value>, ctx: &ToolContext<'_>| {
                recorder.record(parameters, ctx);
                Ok(output.clone())
            },
        );
    }
    (catalog, recorder)
}

/// Recording catalog with `global_search` and `create_invoice`.
pub fn invoice_catalog() -> (ToolCatalog, Recorder) {
    recording_catalog(&[
        (
            "global_search",
            json!({"clients": [{"id": "c1", "name": "Simon Parrott"}]}),
        ),
        ("create_invoice", json!({"invoice_id": "inv_1", "status": "sent"})),
    ])
}

/// Oracle that replays queued completions and captures requests.
#[derive(Default)]
pub struct ScriptedOracle {
    responses: RefCell<VecDeque<Result<String, OracleError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle answering once with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new().then_reply(text)
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.responses.borrow_mut().push_back(Ok(text.into()));
        self
    }

    pub fn then_fail(self, err: OracleError) -> Self {
        self.responses.borrow_mut().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl PlanOracle for ScriptedOracle {
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("scripted oracle has no responses left").into()))
    }
}
