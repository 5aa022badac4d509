//! Resolution of step parameters against earlier step results.
//!
//! A [`ParamValue::StepOutput`] is replaced by a value extracted from the
//! referenced step's result. Which value is extracted is decided by the
//! [`ExtractorRegistry`]: a rule registered for `(tool, parameter)` wins over
//! a rule registered for the parameter name alone. Without a matching rule, or
//! when the rule finds nothing, the whole result is substituted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::types::{ParamValue, PlanStep, StepResults};
use crate::error::ExecutionError;

/// Picks the value a parameter receives out of a referenced step's result.
pub trait Extractor: Send + Sync {
    fn extract(&self, result: &Value) -> Option<Value>;
}

/// Tries JSON pointers in order; the first non-null hit wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRule {
    pointers: Vec<String>,
}

impl PointerRule {
    pub fn new<I, S>(pointers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pointers: pointers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Extractor for PointerRule {
    fn extract(&self, result: &Value) -> Option<Value> {
        self.pointers
            .iter()
            .filter_map(|pointer| result.pointer(pointer))
            .find(|value| !value.is_null())
            .cloned()
    }
}

struct FnExtractor<F>(F);

impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync,
{
    fn extract(&self, result: &Value) -> Option<Value> {
        (self.0)(result)
    }
}

/// Extraction rules keyed by parameter name, optionally scoped to one tool.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_tool: HashMap<(String, String), Arc<dyn Extractor>>,
    by_parameter: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Registry without any rules: every reference receives the raw result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in rules.
    ///
    /// `client_id` takes the first search hit (`/clients/0/id`) or a direct
    /// match (`/data/match/id`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_parameter(
            "client_id",
            PointerRule::new(["/clients/0/id", "/data/match/id"]),
        );
        registry
    }

    pub fn register_parameter(
        &mut self,
        parameter: impl Into<String>,
        extractor: impl Extractor + 'static,
    ) -> &mut Self {
        self.by_parameter
            .insert(parameter.into(), Arc::new(extractor));
        self
    }

    pub fn register_tool_parameter(
        &mut self,
        tool: impl Into<String>,
        parameter: impl Into<String>,
        extractor: impl Extractor + 'static,
    ) -> &mut Self {
        self.by_tool
            .insert((tool.into(), parameter.into()), Arc::new(extractor));
        self
    }

    /// Register a closure as a parameter-name rule.
    pub fn register_parameter_fn<F>(&mut self, parameter: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.register_parameter(parameter, FnExtractor(f))
    }

    fn rule(&self, tool: &str, parameter: &str) -> Option<&Arc<dyn Extractor>> {
        self.by_tool
            .get(&(tool.to_string(), parameter.to_string()))
            .or_else(|| self.by_parameter.get(parameter))
    }

    /// Value for `parameter` of a `tool` step, taken from a referenced result.
    pub fn extract(&self, tool: &str, parameter: &str, result: &Value) -> Value {
        self.rule(tool, parameter)
            .and_then(|rule| rule.extract(result))
            .unwrap_or_else(|| result.clone())
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tool_keys: Vec<String> = self
            .by_tool
            .keys()
            .map(|(tool, parameter)| format!("{tool}.{parameter}"))
            .collect();
        tool_keys.sort();
        let mut parameter_keys: Vec<&String> = self.by_parameter.keys().collect();
        parameter_keys.sort();
        f.debug_struct("ExtractorRegistry")
            .field("by_tool", &tool_keys)
            .field("by_parameter", &parameter_keys)
            .finish()
    }
}

/// Build the concrete parameter object for `step` from recorded results.
pub fn resolve_parameters(
    step: &PlanStep,
    results: &StepResults,
    extractors: &ExtractorRegistry,
) -> Result<Map<String, Value>, ExecutionError> {
    let mut resolved = Map::new();
    for (name, param) in &step.parameters {
        let value = match param {
            ParamValue::Literal(value) => value.clone(),
            ParamValue::StepOutput(step_ref) => {
                let result = results.get(&step_ref.step_id).ok_or_else(|| {
                    ExecutionError::UnresolvedReference {
                        step_id: step.id.clone(),
                        parameter: name.clone(),
                        referenced: step_ref.step_id.clone(),
                    }
                })?;
                extractors.extract(&step.tool, name, result)
            }
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}
