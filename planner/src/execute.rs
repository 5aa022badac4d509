//! Plan execution: run steps sequentially, gating on confirmations and
//! dependencies and wiring earlier results into later parameters.
//!
//! The first failing step aborts the run. Steps that already completed are not
//! rolled back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::catalog::{ToolCatalog, ToolContext};
use crate::core::budget::{deadline_passed, step_deadline};
use crate::core::order::{ExecutionOrder, execution_order};
use crate::core::params::{ExtractorRegistry, resolve_parameters};
use crate::core::types::{ExecutionPlan, PlanStep, StepResults};
use crate::error::ExecutionError;
use crate::io::config::PlannerConfig;

/// Tunables for one executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub order: ExecutionOrder,
    /// Limit for a single tool invocation. `None` means unlimited.
    pub step_timeout: Option<Duration>,
}

impl ExecutorSettings {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            order: config.execution.order,
            step_timeout: config.step_timeout(),
        }
    }
}

/// Cooperative cancellation, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes validated plans against a catalog.
#[derive(Debug, Clone)]
pub struct PlanExecutor<'a> {
    catalog: &'a ToolCatalog,
    extractors: ExtractorRegistry,
    settings: ExecutorSettings,
    cancel: CancelFlag,
}

impl<'a> PlanExecutor<'a> {
    /// Executor with the built-in extraction rules and default settings.
    pub fn new(catalog: &'a ToolCatalog) -> Self {
        Self {
            catalog,
            extractors: ExtractorRegistry::with_defaults(),
            settings: ExecutorSettings::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every step of `plan` in execution order.
    ///
    /// `confirmations` lists the step ids a human approved; it is the only
    /// confirmation input. `caller` is handed to every tool untouched.
    #[instrument(skip_all, fields(steps = plan.steps.len(), order = ?self.settings.order))]
    pub fn execute_plan<S: AsRef<str>>(
        &self,
        plan: &ExecutionPlan,
        confirmations: &[S],
        caller: &Value,
    ) -> Result<StepResults, ExecutionError> {
        let order = execution_order(plan, self.settings.order)?;
        let mut results = StepResults::new();

        for idx in order {
            let step = &plan.steps[idx];
            if let Err(err) = self.run_step(step, confirmations, caller, &mut results) {
                warn!(step_id = %step.id, tool = %step.tool, err = %err, "step failed, aborting plan");
                return Err(err);
            }
        }

        info!(completed = results.len(), "plan executed");
        Ok(results)
    }

    fn run_step<S: AsRef<str>>(
        &self,
        step: &PlanStep,
        confirmations: &[S],
        caller: &Value,
        results: &mut StepResults,
    ) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled {
                step_id: step.id.clone(),
            });
        }

        if step.requires_user_confirmation
            && !confirmations.iter().any(|id| id.as_ref() == step.id)
        {
            return Err(ExecutionError::MissingConfirmation {
                step_id: step.id.clone(),
            });
        }

        if let Some(missing) = step
            .dependencies
            .iter()
            .find(|dependency| !results.contains(dependency))
        {
            return Err(ExecutionError::UnsatisfiedDependency {
                step_id: step.id.clone(),
                dependency: missing.clone(),
            });
        }

        let parameters = resolve_parameters(step, results, &self.extractors)?;

        let entry = self
            .catalog
            .get(&step.tool)
            .ok_or_else(|| ExecutionError::ToolNotFound {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
            })?;

        info!(step_id = %step.id, tool = %step.tool, "step started");
        let started = Instant::now();
        let deadline = step_deadline(started, self.settings.step_timeout);
        let ctx = ToolContext {
            step_id: &step.id,
            tool: &step.tool,
            caller,
            deadline,
        };
        let output = entry
            .handler
            .invoke(&parameters, &ctx)
            .map_err(|source| ExecutionError::ToolFailed {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                source,
            })?;

        if deadline_passed(deadline, Instant::now())
            && let Some(limit) = self.settings.step_timeout
        {
            return Err(ExecutionError::StepTimedOut {
                step_id: step.id.clone(),
                limit,
            });
        }

        info!(
            step_id = %step.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "step completed"
        );
        results.insert(step.id.clone(), output);
        Ok(())
    }
}
