//! Scheduling engine: materialization, completion roll-up and billing.
//!
//! `Engine` composes a [`ScheduleStore`] and an [`EventBus`]. Every step runs
//! in exactly one store transaction and publishes its events only after the
//! transaction has committed.
//!
//! ## Step Flow
//!
//! ```text
//! materialize_periods(work order, today)
//!   lock work order -> walk windows -> insert eligible periods + tasks -> commit
//!   -> publish PeriodMaterialized
//!
//! record_task_status(task, status, today)
//!   lock work order -> lock period -> write task -> recount -> commit
//!   -> publish PeriodCompleted / PeriodReopened
//!   -> completed: bill_period (own transaction)
//!   -> reopened:  reverse billing (own transaction)
//!
//! bill_period(period, today)
//!   lock work order -> lock period -> preconditions -> number -> insert draft -> commit
//!   -> publish InvoiceDrafted / BillingSkipped
//! ```
//!
//! ## Failure Boundary
//!
//! | Operation | On failure |
//! |-----------|------------|
//! | `materialize_periods` | logged, counted, reported as `Halt::Failed` |
//! | `record_task_status` | error returned only if the status write itself failed |
//! | `bill_period` | logged, counted, reported as `BillingOutcome::Failed` |
//!
//! Publish failures are logged and never undo a committed step.

mod aggregator;
mod billing;
mod error;
mod materializer;

pub use aggregator::{ReversalOutcome, TaskStatusReport};
pub use billing::BillingOutcome;
pub use error::EngineError;
pub use materializer::{Halt, MaterializeReport, MaterializedPeriod};

use tracing::{error, warn};

use cadence_core::{TenantId, WorkOrderId};
use cadence_events::{EventBus, EventEnvelope, ScheduleEvent};
use cadence_observability::metrics;

use crate::config::EngineConfig;
use crate::store::{ScheduleStore, ScheduleTx, WorkOrderProgress};

/// Message type carried on the engine's bus.
pub type ScheduleEnvelope = EventEnvelope<ScheduleEvent>;

#[derive(Debug)]
pub struct Engine<S, B> {
    store: S,
    bus: B,
    config: EngineConfig,
}

impl<S, B> Engine<S, B> {
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> Engine<S, B>
where
    S: ScheduleStore,
    B: EventBus<ScheduleEnvelope>,
{
    /// Period counts of a work order.
    pub async fn work_order_progress(
        &self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<WorkOrderProgress, EngineError> {
        let mut tx = self.store.begin().await?;
        let progress = tx
            .work_order_progress(tenant_id, work_order_id)
            .await
            .map_err(EngineError::from);
        finish(tx, progress).await
    }

    fn publish(&self, tenant_id: TenantId, events: Vec<ScheduleEvent>) {
        for event in events {
            if let Err(e) = self.bus.publish(EventEnvelope::new(tenant_id, event)) {
                warn!(tenant_id = %tenant_id, error = ?e, "failed to publish schedule event");
            }
        }
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Box<dyn ScheduleTx>,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

fn report_failure(operation: &'static str, tenant_id: TenantId, err: &EngineError) {
    error!(operation, tenant_id = %tenant_id, kind = err.kind(), error = %err, "engine step failed");
    metrics::record_failure(operation, err.kind());
}
