//! Typed failures for planning and execution.
//!
//! Callers match on these to decide whether to re-plan, retry, or ask a human.
//! Handler and I/O causes are kept as `anyhow` sources so context chains
//! survive into `{:#}` output.

use std::time::Duration;

use thiserror::Error;

/// Failure of `generate_execution_plan`.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("plan oracle failed after {attempts} attempt(s)")]
    Oracle {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("plan oracle timed out after {timeout:?} ({attempts} attempt(s))")]
    Timeout { attempts: u32, timeout: Duration },

    #[error("plan oracle response is not a single JSON object: {reason}")]
    InvalidResponse { reason: String, excerpt: String },

    #[error("render planning prompt")]
    Prompt(#[source] anyhow::Error),
}

/// Failure reported by a [`crate::io::oracle::PlanOracle`] backend.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl OracleError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Failure that aborted `execute_plan`. Every variant names the offending step.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("step '{step_id}' requires user confirmation")]
    MissingConfirmation { step_id: String },

    #[error("step '{step_id}' depends on '{dependency}', which has not completed")]
    UnsatisfiedDependency { step_id: String, dependency: String },

    #[error(
        "step '{step_id}' parameter '{parameter}' references step '{referenced}', which has no result"
    )]
    UnresolvedReference {
        step_id: String,
        parameter: String,
        referenced: String,
    },

    #[error("step '{step_id}' uses unknown tool '{tool}'")]
    ToolNotFound { step_id: String, tool: String },

    #[error("step '{step_id}' tool '{tool}' failed")]
    ToolFailed {
        step_id: String,
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("step '{step_id}' exceeded its {limit:?} time limit")]
    StepTimedOut { step_id: String, limit: Duration },

    #[error("execution cancelled before step '{step_id}'")]
    Cancelled { step_id: String },

    #[error("step '{step_id}' is part of a dependency cycle")]
    DependencyCycle { step_id: String },
}

impl ExecutionError {
    /// Id of the step at which execution stopped.
    pub fn step_id(&self) -> &str {
        match self {
            Self::MissingConfirmation { step_id }
            | Self::UnsatisfiedDependency { step_id, .. }
            | Self::UnresolvedReference { step_id, .. }
            | Self::ToolNotFound { step_id, .. }
            | Self::ToolFailed { step_id, .. }
            | Self::StepTimedOut { step_id, .. }
            | Self::Cancelled { step_id }
            | Self::DependencyCycle { step_id } => step_id,
        }
    }
}
