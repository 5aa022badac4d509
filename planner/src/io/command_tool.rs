//! Tools implemented by external commands.
//!
//! The command receives `{"step_id", "tool", "parameters", "context"}` as JSON
//! on stdin and must print one JSON value on stdout. A non-zero exit status is
//! a tool failure.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::catalog::{ToolCatalog, ToolContext, ToolHandler};
use crate::core::budget::remaining_budget;
use crate::io::config::{CommandToolConfig, PlannerConfig};
use crate::io::process::run_with_timeout;

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    step_id: &'a str,
    tool: &'a str,
    parameters: &'a Map<String, Value>,
    context: &'a Value,
}

/// A [`ToolHandler`] that runs a configured command.
#[derive(Debug, Clone)]
pub struct CommandTool {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandTool {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &CommandToolConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }

    /// Configured timeout, shortened to the step deadline when there is one.
    fn effective_timeout(&self, ctx: &ToolContext<'_>) -> Result<Duration> {
        match ctx.deadline {
            Some(deadline) => Ok(self.timeout.min(remaining_budget(deadline)?)),
            None => Ok(self.timeout),
        }
    }
}

impl ToolHandler for CommandTool {
    #[instrument(skip_all, fields(step_id = ctx.step_id, tool = ctx.tool))]
    fn invoke(&self, parameters: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("tool command is empty"))?;
        let timeout = self.effective_timeout(ctx)?;

        let request = serde_json::to_vec(&ToolRequest {
            step_id: ctx.step_id,
            tool: ctx.tool,
            parameters,
            context: ctx.caller,
        })
        .context("serialize tool request")?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_with_timeout(cmd, Some(&request), timeout, self.output_limit_bytes)
            .with_context(|| format!("run tool command {program}"))?;

        if output.timed_out {
            bail!("tool command timed out after {timeout:?}");
        }
        if !output.status.success() {
            bail!(
                "tool command exited with status {:?}: {}",
                output.status.code(),
                output.stderr_excerpt()
            );
        }
        if output.stdout_truncated > 0 {
            bail!(
                "tool output exceeded {} bytes",
                self.output_limit_bytes
            );
        }

        let text = output.stdout_text()?;
        debug!(output_bytes = text.len(), "tool command finished");
        serde_json::from_str(text.trim()).context("tool output is not valid JSON")
    }
}

/// Catalog of the command tools declared in the config.
pub fn build_catalog(config: &PlannerConfig) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for tool in &config.tools {
        catalog.register(
            tool.name.clone(),
            tool.description.clone(),
            CommandTool::from_config(tool),
        );
    }
    catalog
}
