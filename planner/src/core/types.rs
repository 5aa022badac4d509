//! Plan model shared by synthesis, validation, and execution.
//!
//! The serialized form of these types is the plan wire format: a plan written
//! by [`crate::io::plan_store`] can be fed back to the oracle or loaded again
//! without loss.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire prefix marking a parameter value as a reference to an earlier step's output.
pub const STEP_REF_PREFIX: &str = "from_step_";

/// Display-only risk classification of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Display-only complexity classification of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl Complexity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

/// Reference to the recorded output of another step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub step_id: String,
}

/// A step parameter: either a literal or a reference to another step's output.
///
/// On the wire a reference is the string `from_step_<id>`; everything else is a
/// literal. Conversion happens only at (de)serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ParamValue {
    Literal(Value),
    StepOutput(StepRef),
}

impl ParamValue {
    pub fn step_output(step_id: impl Into<String>) -> Self {
        Self::StepOutput(StepRef {
            step_id: step_id.into(),
        })
    }

    pub fn step_ref(&self) -> Option<&StepRef> {
        match self {
            Self::StepOutput(step_ref) => Some(step_ref),
            Self::Literal(_) => None,
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        let referenced = value
            .as_str()
            .and_then(|s| s.strip_prefix(STEP_REF_PREFIX))
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        match referenced {
            Some(step_id) => Self::StepOutput(StepRef { step_id }),
            None => Self::Literal(value),
        }
    }
}

impl From<ParamValue> for Value {
    fn from(param: ParamValue) -> Self {
        match param {
            ParamValue::Literal(value) => value,
            ParamValue::StepOutput(step_ref) => {
                Value::String(format!("{STEP_REF_PREFIX}{}", step_ref.step_id))
            }
        }
    }
}

/// One tool invocation within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    /// Human-readable description; no semantic effect.
    pub action: String,
    /// Exact, case-sensitive catalog name.
    pub tool: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    /// Step ids that must have recorded a result before this step runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub reasoning: String,
    pub estimated_duration: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_user_confirmation: bool,
}

/// Canonical, validated plan. Step order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub total_estimated_duration: String,
    pub complexity: Complexity,
    /// Advisory count produced by the oracle. Never used for gating.
    pub user_confirmations_required: u64,
}

impl ExecutionPlan {
    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.id == id)
    }
}

/// Outcome of the planning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Ready,
    RequiresConfirmation,
    Blocked,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::Blocked => "blocked",
        }
    }
}

/// Synthesis output handed to the caller before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    pub plan: ExecutionPlan,
    pub status: PlanStatus,
    pub confirmations_needed: Vec<PlanStep>,
}

/// Per-run results map: step id to tool output, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResults(IndexMap<String, Value>);

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step_id: impl Into<String>, value: Value) {
        self.0.insert(step_id.into(), value);
    }

    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.0.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.0.contains_key(step_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Step ids in the order their results were recorded.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(id, value)| (id.as_str(), value))
    }
}
