//! Side-effecting helpers: child processes, config and plan files, prompts.

pub mod command_tool;
pub mod config;
pub mod oracle;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod retry;
