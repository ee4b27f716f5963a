//! Process-wide logging setup for hosts embedding the stock core.

/// Initialize structured logging with the default `info` filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with_default("info");
}

/// Subscriber configuration (filters, JSON layer).
pub mod tracing;
