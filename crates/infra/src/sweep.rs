//! Daily materialization sweep across every active work order.

use chrono::NaiveDate;
use tracing::{error, info, instrument};

use cadence_core::WorkOrderId;
use cadence_events::EventBus;

use crate::engine::{Engine, EngineError, Halt, ScheduleEnvelope};
use crate::store::ScheduleStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    /// `None` when the work-order listing itself failed.
    pub work_order_id: Option<WorkOrderId>,
    pub error: EngineError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub examined: u32,
    pub periods_created: u32,
    pub failures: Vec<SweepFailure>,
}

/// Runs [`Engine::materialize_periods`] for every active work order.
///
/// One work order failing never stops the others.
#[derive(Debug)]
pub struct DailySweep<'a, S, B> {
    engine: &'a Engine<S, B>,
}

impl<'a, S, B> DailySweep<'a, S, B>
where
    S: ScheduleStore,
    B: EventBus<ScheduleEnvelope>,
{
    pub fn new(engine: &'a Engine<S, B>) -> Self {
        Self { engine }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, today: NaiveDate) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let work_orders = match self.engine.store().active_work_orders().await {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "failed to list active work orders");
                summary.failures.push(SweepFailure {
                    work_order_id: None,
                    error: e.into(),
                });
                return summary;
            }
        };

        for (tenant_id, work_order_id) in work_orders {
            summary.examined += 1;
            let report = self
                .engine
                .materialize_periods(tenant_id, work_order_id, today)
                .await;
            summary.periods_created += report.created_count();
            if let Halt::Failed(error) = report.halted {
                summary.failures.push(SweepFailure {
                    work_order_id: Some(work_order_id),
                    error,
                });
            }
        }

        info!(
            examined = summary.examined,
            periods_created = summary.periods_created,
            failures = summary.failures.len(),
            "daily sweep finished"
        );
        summary
    }
}
