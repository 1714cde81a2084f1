use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use cadence_core::{PeriodId, TenantId, WorkOrderId};
use cadence_events::{EventBus, ScheduleEvent};
use cadence_observability::metrics;
use cadence_scheduling::{Eligibility, PeriodWalk, RecurrencePattern, TaskTemplate, plan_period};

use super::{Engine, EngineError, ScheduleEnvelope, finish, report_failure};
use crate::store::{ScheduleStore, ScheduleTx};

/// A period created by one materialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedPeriod {
    pub period_id: PeriodId,
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub task_count: u32,
}

/// Why a materialization walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// The next window starts after today.
    ReachedToday,
    /// The next window still has an occurrence due today or later.
    NotYetDue { key: String, latest_due: NaiveDate },
    /// `max_periods_per_run` new windows were examined; the next run resumes.
    Limit,
    WorkOrderInactive,
    /// A concurrent run wrote the same periods first; this run's writes were discarded.
    Superseded,
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub work_order_id: WorkOrderId,
    pub created: Vec<MaterializedPeriod>,
    /// Windows already present in the store.
    pub skipped_existing: u32,
    /// Windows with no task occurrence; never created.
    pub skipped_empty: u32,
    pub halted: Halt,
}

impl MaterializeReport {
    fn new(work_order_id: WorkOrderId, halted: Halt) -> Self {
        Self {
            work_order_id,
            created: Vec::new(),
            skipped_existing: 0,
            skipped_empty: 0,
            halted,
        }
    }

    pub fn created_count(&self) -> u32 {
        u32::try_from(self.created.len()).unwrap_or(u32::MAX)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.halted, Halt::Failed(_))
    }
}

impl<S, B> Engine<S, B>
where
    S: ScheduleStore,
    B: EventBus<ScheduleEnvelope>,
{
    /// Create every period of the work order that is eligible as of `today`.
    ///
    /// Never fails: errors are logged, counted and reported in
    /// [`MaterializeReport::halted`]. Re-running on the same day is a no-op.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, work_order_id = %work_order_id))]
    pub async fn materialize_periods(
        &self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        today: NaiveDate,
    ) -> MaterializeReport {
        let result = match self.store.begin().await {
            Ok(mut tx) => {
                let walked = self
                    .walk_periods(tx.as_mut(), tenant_id, work_order_id, today)
                    .await;
                finish(tx, walked).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(report) => {
                if !report.created.is_empty() {
                    info!(
                        created = report.created.len(),
                        skipped_existing = report.skipped_existing,
                        halted = ?report.halted,
                        "periods materialized"
                    );
                    metrics::record_periods_materialized(
                        &tenant_id.to_string(),
                        u64::from(report.created_count()),
                    );
                    self.publish(
                        tenant_id,
                        report
                            .created
                            .iter()
                            .map(|p| ScheduleEvent::PeriodMaterialized {
                                work_order_id,
                                period_id: p.period_id,
                                key: p.key.clone(),
                                start: p.start,
                                end: p.end,
                                task_count: p.task_count,
                                on: today,
                            })
                            .collect(),
                    );
                } else {
                    debug!(halted = ?report.halted, "nothing to materialize");
                }
                report
            }
            Err(EngineError::IdempotencyConflict(msg)) => {
                info!(reason = %msg, "materialization superseded by a concurrent run");
                MaterializeReport::new(work_order_id, Halt::Superseded)
            }
            Err(err) => {
                report_failure("materialize_periods", tenant_id, &err);
                MaterializeReport::new(work_order_id, Halt::Failed(err))
            }
        }
    }

    async fn walk_periods(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        today: NaiveDate,
    ) -> Result<MaterializeReport, EngineError> {
        let work_order = tx
            .lock_work_order(tenant_id, work_order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("work order", work_order_id))?;

        if !work_order.is_active() {
            info!(status = work_order.status.as_str(), "work order is not active");
            return Ok(MaterializeReport::new(work_order_id, Halt::WorkOrderInactive));
        }

        let templates = tx.task_templates(tenant_id, work_order.service_id).await?;
        let existing: HashSet<(NaiveDate, NaiveDate)> = tx
            .periods_for_work_order(tenant_id, work_order_id)
            .await?
            .iter()
            .map(|p| (p.start, p.end))
            .collect();

        let templates = usable_templates(templates, work_order.pattern());

        let mut report = MaterializeReport::new(work_order_id, Halt::ReachedToday);
        // Stored windows are not charged against the limit.
        let mut budget = self.config.max_periods_per_run;

        for window in PeriodWalk::for_work_order(&work_order) {
            if window.start() > today {
                break;
            }
            if existing.contains(&(window.start(), window.end())) {
                report.skipped_existing += 1;
                continue;
            }
            if budget == 0 {
                report.halted = Halt::Limit;
                break;
            }
            budget -= 1;

            let plan = plan_period(&work_order, &templates, window);
            match plan.eligibility(today) {
                Eligibility::Future => break,
                Eligibility::NotYetDue { latest_due } => {
                    debug!(key = %window.key(), %latest_due, "window not yet due");
                    report.halted = Halt::NotYetDue {
                        key: window.key(),
                        latest_due,
                    };
                    break;
                }
                Eligibility::Empty => {
                    debug!(key = %window.key(), "window has no task occurrences");
                    report.skipped_empty += 1;
                }
                Eligibility::Eligible { .. } => {
                    let (period, tasks) = plan.into_records(tenant_id, work_order_id);
                    if !tx.insert_period(&period).await? {
                        report.skipped_existing += 1;
                        continue;
                    }
                    for task in &tasks {
                        tx.insert_task_instance(task).await?;
                    }
                    report.created.push(MaterializedPeriod {
                        period_id: period.id,
                        key: period.key,
                        start: period.start,
                        end: period.end,
                        task_count: period.total_tasks,
                    });
                }
            }
        }

        Ok(report)
    }
}

/// Drop templates that recur less often than the work order's periods.
fn usable_templates(templates: Vec<TaskTemplate>, pattern: RecurrencePattern) -> Vec<TaskTemplate> {
    templates
        .into_iter()
        .filter(|template| {
            let fits = template.fits(pattern);
            if !fits {
                warn!(
                    template_id = %template.id,
                    frequency = template.frequency.as_str(),
                    pattern = pattern.as_str(),
                    reason = "template_coarser_than_work_order",
                    "task template ignored"
                );
            }
            fits
        })
        .collect()
}
