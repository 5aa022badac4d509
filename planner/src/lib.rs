//! Self-planning agent core.
//!
//! A free-text request is turned into a plan of tool invocations by an
//! external oracle, validated, gated behind human confirmation, and executed
//! step by step with earlier results wired into later parameters.
//!
//! - **[`core`]**: Pure, deterministic logic (plan model, validation,
//!   confirmation gate, parameter resolution, execution order). No I/O.
//! - **[`io`]**: Side effects (oracle and tool processes, config and plan
//!   files, prompt rendering).
//!
//! Orchestration lives in [`synthesize`] and [`execute`]; both take the
//! [`catalog::ToolCatalog`] by reference.

pub mod catalog;
pub mod core;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod synthesize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
