//! Self-planning agent CLI.
//!
//! Plans a request with the configured oracle, writes the plan for human
//! review, and executes approved plans against command-backed tools.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use planner::core::types::PlanStatus;
use planner::execute::{ExecutorSettings, PlanExecutor};
use planner::exit_codes;
use planner::io::command_tool::build_catalog;
use planner::io::config::{PlannerConfig, load_config, write_config};
use planner::io::oracle::CommandOracle;
use planner::io::plan_store::{load_plan, write_plan};
use planner::logging;
use planner::synthesize::{PlanSynthesizer, SynthesizerSettings};

#[derive(Parser)]
#[command(
    name = "planner",
    version,
    about = "Plan and execute tool calls from free-text requests"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = "planner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file (existing file kept unless --force).
    Init {
        #[arg(long)]
        force: bool,
    },
    /// List the configured tools as they appear in planning prompts.
    Tools,
    /// Generate a plan for REQUEST and print the planning result as JSON.
    Plan {
        request: String,
        /// Also write the plan to this file for `planner execute`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Execute a plan file and print the step results as JSON.
    Execute {
        plan: PathBuf,
        /// Approve a step that requires confirmation (repeatable).
        #[arg(long = "confirm", value_name = "STEP_ID")]
        confirmations: Vec<String>,
        /// JSON value passed to every tool as its context.
        #[arg(long, value_name = "JSON")]
        context: Option<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = || load_config(&cli.config);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Tools => cmd_tools(&config()?),
        Command::Plan { request, out } => cmd_plan(&config()?, &request, out.as_deref()),
        Command::Execute {
            plan,
            confirmations,
            context,
        } => cmd_execute(&config()?, &plan, &confirmations, context.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &PlannerConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_tools(config: &PlannerConfig) -> Result<i32> {
    let listing = build_catalog(config).listing();
    if !listing.is_empty() {
        println!("{listing}");
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(config: &PlannerConfig, request: &str, out: Option<&Path>) -> Result<i32> {
    let catalog = build_catalog(config);
    let oracle = CommandOracle::new(
        config.oracle.command.clone(),
        config.oracle.output_limit_bytes,
    );
    let result = PlanSynthesizer::new(&catalog, oracle, SynthesizerSettings::from_config(config))
        .generate_execution_plan(request)
        .context("generate plan")?;

    if let Some(out) = out {
        write_plan(out, &result.plan)?;
    }
    print_json(&result)?;

    Ok(match result.status {
        PlanStatus::Ready => exit_codes::OK,
        PlanStatus::RequiresConfirmation => exit_codes::NEEDS_CONFIRMATION,
        PlanStatus::Blocked => exit_codes::BLOCKED,
    })
}

fn cmd_execute(
    config: &PlannerConfig,
    plan_path: &Path,
    confirmations: &[String],
    context: Option<&str>,
) -> Result<i32> {
    let plan = load_plan(plan_path)?;
    let caller: Value = match context {
        Some(raw) => serde_json::from_str(raw).context("parse --context JSON")?,
        None => Value::Null,
    };
    let catalog = build_catalog(config);
    let executor = PlanExecutor::new(&catalog)
        .with_extractors(config.extractor_registry())
        .with_settings(ExecutorSettings::from_config(config));

    match executor.execute_plan(&plan, confirmations, &caller) {
        Ok(results) => {
            print_json(&results)?;
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("{:#}", anyhow::Error::new(err));
            Ok(exit_codes::ABORTED)
        }
    }
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
