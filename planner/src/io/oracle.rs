//! Plan-generation oracle abstraction.
//!
//! The [`PlanOracle`] trait decouples plan synthesis from the completion
//! backend. [`CommandOracle`] talks to any executable that reads a request
//! envelope on stdin and prints the completion on stdout; tests use scripted
//! oracles that return canned completions.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::OracleError;
use crate::io::process::run_with_timeout;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    /// Lower is more deterministic.
    pub temperature: f32,
    /// Ask the backend to constrain output to a single JSON object.
    pub json_object: bool,
    /// Deadline for this call.
    pub timeout: Duration,
}

/// Abstraction over completion backends.
pub trait PlanOracle {
    /// Return the raw completion text for `request`.
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError>;
}

impl<O: PlanOracle + ?Sized> PlanOracle for &O {
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        (**self).complete(request)
    }
}

/// Stdin payload sent to a [`CommandOracle`] process.
#[derive(Debug, Serialize)]
struct OracleEnvelope<'a> {
    system: &'a str,
    prompt: &'a str,
    temperature: f32,
    response_format: &'static str,
}

impl<'a> OracleEnvelope<'a> {
    fn from_request(request: &'a CompletionRequest) -> Self {
        Self {
            system: &request.system,
            prompt: &request.prompt,
            temperature: request.temperature,
            response_format: if request.json_object {
                "json_object"
            } else {
                "text"
            },
        }
    }
}

/// Oracle backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn new(command: Vec<String>, output_limit_bytes: usize) -> Self {
        Self {
            command,
            output_limit_bytes,
        }
    }
}

impl PlanOracle for CommandOracle {
    #[instrument(skip_all, fields(program = self.command.first().map(String::as_str), timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let envelope = serde_json::to_vec(&OracleEnvelope::from_request(request))
            .context("serialize oracle request")?;
        info!(prompt_bytes = request.prompt.len(), "calling plan oracle");

        let output = run_with_timeout(
            cmd,
            Some(&envelope),
            request.timeout,
            self.output_limit_bytes,
        )
        .context("run oracle command")?;

        if output.timed_out {
            return Err(OracleError::Timeout(request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(anyhow!(
                "oracle command exited with status {:?}: {}",
                output.status.code(),
                output.stderr_excerpt()
            )
            .into());
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "oracle output exceeded {} bytes ({} truncated)",
                self.output_limit_bytes,
                output.stdout_truncated
            )
            .into());
        }

        let text = output.stdout_text()?.to_string();
        debug!(completion_bytes = text.len(), "oracle completed");
        Ok(text)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request(timeout: Duration) -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            prompt: "plan this".to_string(),
            temperature: 0.1,
            json_object: true,
            timeout,
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn envelope_is_written_to_stdin() {
        let oracle = CommandOracle::new(sh("cat"), 10_000);
        let text = oracle
            .complete(&request(Duration::from_secs(5)))
            .expect("complete");
        let envelope: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(envelope["system"], "sys");
        assert_eq!(envelope["prompt"], "plan this");
        assert_eq!(envelope["response_format"], "json_object");
    }

    #[test]
    fn slow_command_times_out() {
        let oracle = CommandOracle::new(sh("exec sleep 5"), 10_000);
        let err = oracle
            .complete(&request(Duration::from_millis(100)))
            .expect_err("timeout");
        assert!(err.is_timeout());
    }

    #[test]
    fn failing_command_reports_stderr() {
        let oracle = CommandOracle::new(sh("echo 'quota exceeded' >&2; exit 1"), 10_000);
        let err = oracle
            .complete(&request(Duration::from_secs(5)))
            .expect_err("failure");
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let oracle = CommandOracle::new(Vec::new(), 10_000);
        let err = oracle
            .complete(&request(Duration::from_secs(1)))
            .expect_err("empty");
        assert!(err.to_string().contains("oracle command is empty"));
    }
}
