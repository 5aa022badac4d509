//! Plan synthesis: request text to a gated [`PlanningResult`].

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::catalog::ToolCatalog;
use crate::core::confirmation::UnknownToolPolicy;
use crate::core::types::PlanningResult;
use crate::core::validate::{RawPlan, plan_issues, unknown_tool_warnings, validate_and_enhance};
use crate::error::{OracleError, SynthesisError};
use crate::io::config::PlannerConfig;
use crate::io::oracle::{CompletionRequest, PlanOracle};
use crate::io::prompt::{PlanPromptInputs, PromptBuilder, PromptPack, SYSTEM_PROMPT};
use crate::io::retry::RetryPolicy;

/// Tunables for one synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizerSettings {
    pub temperature: f32,
    /// Deadline for each oracle attempt.
    pub timeout: Duration,
    pub prompt_budget_bytes: usize,
    pub unknown_tools: UnknownToolPolicy,
    pub retry: RetryPolicy,
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            timeout: Duration::from_secs(120),
            prompt_budget_bytes: 40_000,
            unknown_tools: UnknownToolPolicy::Warn,
            retry: RetryPolicy::default(),
        }
    }
}

impl SynthesizerSettings {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            temperature: config.oracle.temperature,
            timeout: config.oracle_timeout(),
            prompt_budget_bytes: config.oracle.prompt_budget_bytes,
            unknown_tools: config.execution.unknown_tools,
            retry: config.retry.policy(),
        }
    }
}

/// Turns free-text requests into validated, gated plans.
pub struct PlanSynthesizer<'a, O> {
    catalog: &'a ToolCatalog,
    oracle: O,
    settings: SynthesizerSettings,
}

impl<'a, O: PlanOracle> PlanSynthesizer<'a, O> {
    pub fn new(catalog: &'a ToolCatalog, oracle: O, settings: SynthesizerSettings) -> Self {
        Self {
            catalog,
            oracle,
            settings,
        }
    }

    /// Prompt for `request` against the current catalog.
    pub fn build_prompt(&self, request: &str) -> Result<PromptPack, SynthesisError> {
        let listing = self.catalog.listing();
        PromptBuilder::new(self.settings.prompt_budget_bytes)
            .build(&PlanPromptInputs {
                request,
                tool_listing: &listing,
            })
            .map_err(SynthesisError::Prompt)
    }

    /// Ask the oracle for a plan and validate, check, and gate it.
    ///
    /// Oracle failures and timeouts are retried per the retry policy. A
    /// response that is not a single JSON object fails immediately.
    #[instrument(skip_all, fields(request_bytes = request.len(), tools = self.catalog.len()))]
    pub fn generate_execution_plan(&self, request: &str) -> Result<PlanningResult, SynthesisError> {
        info!("planning request received");
        let prompt = self.build_prompt(request)?;
        let completion_request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.into_string(),
            temperature: self.settings.temperature,
            json_object: true,
            timeout: self.settings.timeout,
        };
        debug!(
            prompt_bytes = completion_request.prompt.len(),
            "sending planning prompt"
        );

        let completion = self.complete_with_retry(&completion_request)?;
        let raw = RawPlan::parse(&completion)?;
        let plan = validate_and_enhance(&raw);
        info!(
            steps = plan.steps.len(),
            complexity = ?plan.complexity,
            "plan generated"
        );

        let unknown = unknown_tool_warnings(&plan, |tool| self.catalog.contains(tool));
        for warning in &unknown {
            warn!(
                position = warning.position,
                step_id = %warning.step_id,
                tool = %warning.tool,
                "{warning}"
            );
        }
        for issue in plan_issues(&plan) {
            warn!("plan issue: {issue}");
        }

        let result = PlanningResult::gate(plan, self.settings.unknown_tools, &unknown);
        info!(
            status = result.status.as_str(),
            confirmations_needed = result.confirmations_needed.len(),
            "plan gated"
        );
        Ok(result)
    }

    fn complete_with_retry(&self, request: &CompletionRequest) -> Result<String, SynthesisError> {
        let attempted = self
            .settings
            .retry
            .run(|_| self.oracle.complete(request), |_: &OracleError| true);
        let attempts = attempted.attempts;
        attempted.result.map_err(|err| match err {
            OracleError::Timeout(timeout) => SynthesisError::Timeout { attempts, timeout },
            OracleError::Failed(source) => SynthesisError::Oracle { attempts, source },
        })
    }
}
