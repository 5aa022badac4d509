//! Stable exit codes for planner CLI commands.

/// Command succeeded; a generated plan is ready to execute.
pub const OK: i32 = 0;
/// Invalid config, plan file, or oracle response, or any other error.
pub const INVALID: i32 = 1;
/// `planner plan` produced a plan with steps awaiting confirmation.
pub const NEEDS_CONFIRMATION: i32 = 2;
/// `planner plan` produced a blocked plan (unknown tools under `block`).
pub const BLOCKED: i32 = 3;
/// `planner execute` aborted at a step.
pub const ABORTED: i32 = 4;
