//! Conversion of untrusted oracle output into a canonical [`ExecutionPlan`].
//!
//! [`validate_and_enhance`] is the only way to turn a [`RawPlan`] into an
//! [`ExecutionPlan`]. It never fails: missing or malformed fields degrade to
//! defaults. Problems worth surfacing are reported separately by
//! [`unknown_tool_warnings`] and [`plan_issues`] without touching the plan.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde_json::{Map, Value};

use crate::core::types::{Complexity, ExecutionPlan, ParamValue, PlanStep, RiskLevel};
use crate::error::SynthesisError;

pub const DEFAULT_GOAL: &str = "No goal specified";
pub const UNKNOWN_DURATION: &str = "Unknown";

const EXCERPT_LIMIT: usize = 200;

/// Unvalidated plan object exactly as the oracle produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlan(Map<String, Value>);

impl RawPlan {
    pub fn from_object(object: Map<String, Value>) -> Self {
        Self(object)
    }

    /// Parse oracle output that must be exactly one JSON object.
    pub fn parse(text: &str) -> Result<Self, SynthesisError> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|err| SynthesisError::InvalidResponse {
                reason: err.to_string(),
                excerpt: excerpt(text),
            })?;
        match value {
            Value::Object(object) => Ok(Self(object)),
            other => Err(SynthesisError::InvalidResponse {
                reason: format!("expected an object, got {}", json_kind(&other)),
                excerpt: excerpt(text),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// A step that names a tool absent from the catalog. Non-fatal at planning time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToolWarning {
    /// 1-based position of the step in the plan.
    pub position: usize,
    pub step_id: String,
    pub tool: String,
}

impl fmt::Display for UnknownToolWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} ('{}') references unknown tool '{}'",
            self.position, self.step_id, self.tool
        )
    }
}

/// Structural problem in a plan that is not expressible in its JSON Schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    DuplicateId {
        step_id: String,
    },
    UnknownDependency {
        step_id: String,
        dependency: String,
    },
    UnknownReference {
        step_id: String,
        parameter: String,
        referenced: String,
    },
}

impl PlanIssue {
    /// Duplicate ids make the results map ambiguous; the rest fail at run time.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { step_id } => write!(f, "duplicate step id '{step_id}'"),
            Self::UnknownDependency {
                step_id,
                dependency,
            } => write!(f, "step '{step_id}' depends on unknown step '{dependency}'"),
            Self::UnknownReference {
                step_id,
                parameter,
                referenced,
            } => write!(
                f,
                "step '{step_id}' parameter '{parameter}' references unknown step '{referenced}'"
            ),
        }
    }
}

/// Normalize a raw plan, defaulting every missing or malformed field.
pub fn validate_and_enhance(raw: &RawPlan) -> ExecutionPlan {
    let steps = match raw.get("steps") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| step_from_value(idx + 1, item))
            .collect(),
        _ => Vec::new(),
    };

    ExecutionPlan {
        goal: non_empty_str(raw.get("goal")).unwrap_or(DEFAULT_GOAL).to_string(),
        steps,
        total_estimated_duration: non_empty_str(raw.get("total_estimated_duration"))
            .unwrap_or(UNKNOWN_DURATION)
            .to_string(),
        complexity: non_empty_str(raw.get("complexity"))
            .and_then(Complexity::parse)
            .unwrap_or_default(),
        user_confirmations_required: raw
            .get("user_confirmations_required")
            .and_then(Value::as_f64)
            .map_or(0, |count| count as u64),
    }
}

fn step_from_value(position: usize, value: &Value) -> PlanStep {
    let empty = Map::new();
    let fields = value.as_object().unwrap_or(&empty);
    let text = |key: &str| non_empty_str(fields.get(key)).unwrap_or_default().to_string();

    let parameters: BTreeMap<String, ParamValue> = match fields.get("parameters") {
        Some(Value::Object(params)) => params
            .iter()
            .map(|(name, value)| (name.clone(), ParamValue::from(value.clone())))
            .collect(),
        _ => BTreeMap::new(),
    };

    let dependencies = match fields.get("dependencies") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    };

    PlanStep {
        id: non_empty_str(fields.get("id"))
            .map(str::to_owned)
            .unwrap_or_else(|| format!("step_{position}")),
        action: text("action"),
        tool: text("tool"),
        parameters,
        dependencies,
        reasoning: text("reasoning"),
        estimated_duration: non_empty_str(fields.get("estimated_duration"))
            .unwrap_or(UNKNOWN_DURATION)
            .to_string(),
        risk_level: non_empty_str(fields.get("risk_level"))
            .and_then(RiskLevel::parse)
            .unwrap_or_default(),
        requires_user_confirmation: matches!(
            fields.get("requires_user_confirmation"),
            Some(Value::Bool(true))
        ),
    }
}

/// Report every step whose tool is not an exact catalog name.
pub fn unknown_tool_warnings(
    plan: &ExecutionPlan,
    is_known: impl Fn(&str) -> bool,
) -> Vec<UnknownToolWarning> {
    plan.steps
        .iter()
        .enumerate()
        .filter(|(_, step)| !is_known(&step.tool))
        .map(|(idx, step)| UnknownToolWarning {
            position: idx + 1,
            step_id: step.id.clone(),
            tool: step.tool.clone(),
        })
        .collect()
}

/// Check plan-level invariants: unique ids and references to existing steps.
///
/// Issues are reported in step order.
pub fn plan_issues(plan: &ExecutionPlan) -> Vec<PlanIssue> {
    let known: HashSet<&str> = plan.steps.iter().map(|step| step.id.as_str()).collect();
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for step in &plan.steps {
        if !seen.insert(step.id.as_str()) {
            issues.push(PlanIssue::DuplicateId {
                step_id: step.id.clone(),
            });
        }
        for dependency in &step.dependencies {
            if !known.contains(dependency.as_str()) {
                issues.push(PlanIssue::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        for (parameter, value) in &step.parameters {
            if let Some(step_ref) = value.step_ref()
                && !known.contains(step_ref.step_id.as_str())
            {
                issues.push(PlanIssue::UnknownReference {
                    step_id: step.id.clone(),
                    parameter: parameter.clone(),
                    referenced: step_ref.step_id.clone(),
                });
            }
        }
    }

    issues
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LIMIT).collect()
}
