//! Prometheus metrics for the scheduling engine.
//!
//! Counters live in a dedicated registry so repeated initialization (tests,
//! embedded use) never collides with other collectors. Recording before
//! [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use prometheus::{
    IntCounterVec, Registry, TextEncoder, opts, register_int_counter_vec_with_registry,
};

struct EngineMetrics {
    registry: Registry,
    periods_materialized: IntCounterVec,
    task_status_changes: IntCounterVec,
    invoices_drafted: IntCounterVec,
    invoices_reversed: IntCounterVec,
    billing_skipped: IntCounterVec,
    engine_failures: IntCounterVec,
}

impl EngineMetrics {
    fn register() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let periods_materialized = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_periods_materialized_total",
                "Periods created by the materializer, by tenant"
            ),
            &["tenant_id"],
            registry
        )?;
        let task_status_changes = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_task_status_changes_total",
                "Task instance status writes, by new status"
            ),
            &["status"],
            registry
        )?;
        let invoices_drafted = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_invoices_drafted_total",
                "Draft invoices raised for completed periods, by tenant"
            ),
            &["tenant_id"],
            registry
        )?;
        let invoices_reversed = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_invoices_reversed_total",
                "Draft invoices deleted after a period was reopened, by tenant"
            ),
            &["tenant_id"],
            registry
        )?;
        let billing_skipped = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_billing_skipped_total",
                "Billing attempts that produced no invoice, by reason"
            ),
            &["reason"],
            registry
        )?;
        let engine_failures = register_int_counter_vec_with_registry!(
            opts!(
                "cadence_engine_failures_total",
                "Engine operations that failed and were converted to a no-op"
            ),
            &["operation", "kind"],
            registry
        )?;

        Ok(Self {
            registry,
            periods_materialized,
            task_status_changes,
            invoices_drafted,
            invoices_reversed,
            billing_skipped,
            engine_failures,
        })
    }
}

static METRICS: OnceLock<Option<EngineMetrics>> = OnceLock::new();

fn metrics() -> Option<&'static EngineMetrics> {
    METRICS.get().and_then(Option::as_ref)
}

/// Initialize all metrics. Idempotent; returns whether metrics are available.
pub fn init_metrics() -> bool {
    METRICS
        .get_or_init(|| match EngineMetrics::register() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::error!(error = %e, "failed to register engine metrics");
                None
            }
        })
        .is_some()
}

/// Metrics in Prometheus text format. Empty before initialization.
pub fn gather() -> String {
    let Some(m) = metrics() else {
        return String::new();
    };
    TextEncoder::new()
        .encode_to_string(&m.registry.gather())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to encode metrics");
            String::new()
        })
}

pub fn record_periods_materialized(tenant_id: &str, count: u64) {
    if let Some(m) = metrics() {
        m.periods_materialized
            .with_label_values(&[tenant_id])
            .inc_by(count);
    }
}

pub fn record_task_status_change(status: &str) {
    if let Some(m) = metrics() {
        m.task_status_changes.with_label_values(&[status]).inc();
    }
}

pub fn record_invoice_drafted(tenant_id: &str) {
    if let Some(m) = metrics() {
        m.invoices_drafted.with_label_values(&[tenant_id]).inc();
    }
}

pub fn record_invoice_reversed(tenant_id: &str) {
    if let Some(m) = metrics() {
        m.invoices_reversed.with_label_values(&[tenant_id]).inc();
    }
}

pub fn record_billing_skipped(reason: &str) {
    if let Some(m) = metrics() {
        m.billing_skipped.with_label_values(&[reason]).inc();
    }
}

/// Record a failure that was logged and swallowed at the engine boundary.
pub fn record_failure(operation: &str, kind: &str) {
    if let Some(m) = metrics() {
        m.engine_failures.with_label_values(&[operation, kind]).inc();
    }
}
