//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (tracing/logging and metrics).
///
/// Safe to call multiple times; subsequent calls become no-ops. The log format
/// comes from `CADENCE_LOG_FORMAT`.
pub fn init() {
    tracing::init();
    metrics::init_metrics();
}

/// Same as [`init`] with an explicit log format.
pub fn init_with(format: LogFormat) {
    tracing::init_with(format);
    metrics::init_metrics();
}

/// Prometheus counters for engine outcomes.
pub mod metrics;

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::LogFormat;
