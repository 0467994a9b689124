//! Process-wide logging setup shared by the API binary and tests.

/// Tracing subscriber configuration (filter, JSON formatter).
pub mod tracing;

/// Initialize structured logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}
