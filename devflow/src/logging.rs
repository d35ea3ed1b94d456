//! Diagnostic tracing for devflow.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Command results are
//! printed to stdout by the CLI and are unaffected by the filter, so hook
//! verdicts and status reports stay machine-readable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, which keeps best-effort
/// issue-sync failures visible without any configuration.
///
/// # Example
/// ```bash
/// RUST_LOG=devflow=debug devflow task next
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
