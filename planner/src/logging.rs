//! Diagnostic tracing for the planner.
//!
//! Planning and execution progress (request received, plan generated, step
//! started/finished) are `tracing` events. They never affect control flow and
//! are not part of the CLI's stdout output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr, compact.
///
/// # Example
/// ```bash
/// RUST_LOG=planner=info planner execute plan.json --confirm step_2
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests, embedding apps) keeps the existing subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
