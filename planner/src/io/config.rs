//! Planner configuration stored in `planner.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::confirmation::UnknownToolPolicy;
use crate::core::order::ExecutionOrder;
use crate::core::params::{ExtractorRegistry, PointerRule};
use crate::io::retry::RetryPolicy;

/// Planner configuration (TOML).
///
/// Edited by humans. Missing fields default to values that work with a
/// single local oracle command and no tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    pub oracle: OracleConfig,
    pub retry: RetryConfig,
    pub execution: ExecutionConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CommandToolConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extractors: Vec<ExtractorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Command that reads a request envelope on stdin and prints a completion.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    /// Truncate oracle stdout beyond this many bytes (treated as a failure).
    pub output_limit_bytes: usize,
    /// Maximum bytes for the planning prompt before dropping optional sections.
    pub prompt_budget_bytes: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["plan-oracle".to_string()],
            timeout_secs: 120,
            temperature: 0.1,
            output_limit_bytes: 200_000,
            prompt_budget_bytes: 40_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub order: ExecutionOrder,
    pub unknown_tools: UnknownToolPolicy,
    /// Per-step time limit. Unset means no limit.
    pub step_timeout_secs: Option<u64>,
}

/// A tool implemented by an external command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub command: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tool_output_limit_bytes")]
    pub output_limit_bytes: usize,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_tool_output_limit_bytes() -> usize {
    1_000_000
}

/// A JSON-pointer extraction rule for step-output references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub parameter: String,
    /// Restrict the rule to one tool.
    #[serde(default)]
    pub tool: Option<String>,
    pub pointers: Vec<String>,
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(anyhow!("oracle.temperature must be within 0.0..=2.0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.oracle.prompt_budget_bytes == 0 {
            return Err(anyhow!("oracle.prompt_budget_bytes must be > 0"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(anyhow!("retry.multiplier must be >= 1.0"));
        }
        if self.execution.step_timeout_secs == Some(0) {
            return Err(anyhow!("execution.step_timeout_secs must be > 0 when set"));
        }
        let mut names = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(anyhow!("tools[].name must be non-empty"));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(anyhow!("duplicate tool '{}'", tool.name));
            }
            if tool.command.is_empty() || tool.command[0].trim().is_empty() {
                return Err(anyhow!("tool '{}' command must be a non-empty array", tool.name));
            }
            if tool.timeout_secs == 0 {
                return Err(anyhow!("tool '{}' timeout_secs must be > 0", tool.name));
            }
        }
        for rule in &self.extractors {
            if rule.pointers.is_empty() {
                return Err(anyhow!(
                    "extractor for '{}' needs at least one pointer",
                    rule.parameter
                ));
            }
            if let Some(bad) = rule.pointers.iter().find(|p| !p.is_empty() && !p.starts_with('/')) {
                return Err(anyhow!(
                    "extractor for '{}' has invalid JSON pointer '{bad}'",
                    rule.parameter
                ));
            }
        }
        Ok(())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.execution.step_timeout_secs.map(Duration::from_secs)
    }

    /// Built-in extraction rules plus the configured ones.
    pub fn extractor_registry(&self) -> ExtractorRegistry {
        let mut registry = ExtractorRegistry::with_defaults();
        for rule in &self.extractors {
            let pointers = PointerRule::new(rule.pointers.iter().cloned());
            match &rule.tool {
                Some(tool) => registry.register_tool_parameter(tool, &rule.parameter, pointers),
                None => registry.register_parameter(&rule.parameter, pointers),
            };
        }
        registry
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlannerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlannerConfig> {
    if !path.exists() {
        let cfg = PlannerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlannerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlannerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
