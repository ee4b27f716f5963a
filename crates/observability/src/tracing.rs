//! Tracing subscriber initialization.
//!
//! Output is one JSON object per event. `RUST_LOG` overrides the default
//! directive, e.g. `RUST_LOG=stockcore_infra=debug` to see ledger retries.

use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global JSON subscriber.
///
/// Returns `false` when a global subscriber was already installed (by an
/// earlier call or by the host), in which case nothing changes.
pub fn init_with_default(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(true)
        .try_init()
        .is_ok()
}
