use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use cadence_core::{InvoiceId, PeriodId, TaskInstanceId, TenantId};
use cadence_events::{EventBus, ScheduleEvent};
use cadence_invoicing::InvoiceStatus;
use cadence_observability::metrics;
use cadence_scheduling::{
    CompletionTally, Period, PeriodStatus, PeriodTransition, TaskInstance, TaskStatus,
};

use super::{BillingOutcome, Engine, EngineError, ScheduleEnvelope, finish, report_failure};
use crate::store::{ScheduleStore, ScheduleTx};

/// What undoing a reopened period's billing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalOutcome {
    /// The linked draft invoice was deleted and the period unbilled.
    Deleted { invoice_id: InvoiceId },
    /// The linked invoice has left draft; it and the period's link are kept.
    Retained {
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    },
    /// The period pointed at an invoice that no longer exists; flags cleared.
    Cleared,
    NothingToReverse,
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusReport {
    pub task_id: TaskInstanceId,
    pub period_id: PeriodId,
    pub status: TaskStatus,
    /// `false` when the task already had `status`.
    pub changed: bool,
    pub period_status: PeriodStatus,
    pub transition: PeriodTransition,
    /// Set when the period moved into `completed`.
    pub billing: Option<BillingOutcome>,
    /// Set when the period moved out of `completed`.
    pub reversal: Option<ReversalOutcome>,
}

struct StatusWrite {
    task: TaskInstance,
    period: Period,
    changed: bool,
    transition: PeriodTransition,
}

enum Reversal {
    Deleted { period: Period, invoice_id: InvoiceId },
    Retained { invoice_id: InvoiceId, status: InvoiceStatus },
    Cleared,
    Nothing,
}

impl<S, B> Engine<S, B>
where
    S: ScheduleStore,
    B: EventBus<ScheduleEnvelope>,
{
    /// Set a task's status and roll the change up into its period.
    ///
    /// The status write and the recount commit together. Billing (on entering
    /// `completed`) and reversal (on leaving it) run afterwards in their own
    /// transactions; their failures are reported in the returned report, not
    /// as an error.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, task_id = %task_id), err)]
    pub async fn record_task_status(
        &self,
        tenant_id: TenantId,
        task_id: TaskInstanceId,
        status: TaskStatus,
        today: NaiveDate,
    ) -> Result<TaskStatusReport, EngineError> {
        let mut tx = self.store.begin().await?;
        let written = self
            .write_task_status(tx.as_mut(), tenant_id, task_id, status, today)
            .await;
        let StatusWrite {
            task,
            period,
            changed,
            transition,
        } = finish(tx, written).await?;

        if changed {
            metrics::record_task_status_change(status.as_str());
        }

        let mut report = TaskStatusReport {
            task_id: task.id,
            period_id: period.id,
            status: task.status,
            changed,
            period_status: period.status,
            transition,
            billing: None,
            reversal: None,
        };

        match transition {
            PeriodTransition::Completed => {
                info!(period_id = %period.id, "period completed");
                self.publish(
                    tenant_id,
                    vec![ScheduleEvent::PeriodCompleted {
                        work_order_id: period.work_order_id,
                        period_id: period.id,
                        on: today,
                    }],
                );
                report.billing = Some(self.bill_period(tenant_id, period.id, today).await);
            }
            PeriodTransition::Reopened => {
                info!(period_id = %period.id, "period reopened");
                self.publish(
                    tenant_id,
                    vec![ScheduleEvent::PeriodReopened {
                        work_order_id: period.work_order_id,
                        period_id: period.id,
                        on: today,
                    }],
                );
                report.reversal = Some(self.reverse_billing(tenant_id, period.id, today).await);
            }
            PeriodTransition::Advanced | PeriodTransition::Unchanged => {}
        }

        Ok(report)
    }

    async fn write_task_status(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant_id: TenantId,
        task_id: TaskInstanceId,
        status: TaskStatus,
        today: NaiveDate,
    ) -> Result<StatusWrite, EngineError> {
        let period_id = tx
            .task_instance(tenant_id, task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task instance", task_id))?
            .period_id;
        let work_order_id = tx
            .period(tenant_id, period_id)
            .await?
            .ok_or_else(|| EngineError::not_found("period", period_id))?
            .work_order_id;

        // Work order first, then period.
        tx.lock_work_order(tenant_id, work_order_id).await?;
        let mut period = tx
            .lock_period(tenant_id, period_id)
            .await?
            .ok_or_else(|| EngineError::not_found("period", period_id))?;

        let mut task = tx
            .task_instance(tenant_id, task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task instance", task_id))?;
        let changed = task.set_status(status, today);
        if changed {
            tx.update_task_instance(&task).await?;
        }

        let tally = CompletionTally::from_statuses(
            tx.tasks_for_period(tenant_id, period_id)
                .await?
                .iter()
                .map(|t| t.status),
        );
        let before = period.tally();
        let transition = period.apply_tally(tally);
        if before != tally || transition != PeriodTransition::Unchanged {
            tx.update_period(&period).await?;
        }

        Ok(StatusWrite {
            task,
            period,
            changed,
            transition,
        })
    }

    /// Undo billing of a period that left `completed`.
    ///
    /// Only draft invoices are deleted. A sent, paid or cancelled invoice stays
    /// linked and the period stays billed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period_id = %period_id))]
    async fn reverse_billing(
        &self,
        tenant_id: TenantId,
        period_id: PeriodId,
        today: NaiveDate,
    ) -> ReversalOutcome {
        let result = match self.store.begin().await {
            Ok(mut tx) => {
                let reversed = reverse_in(tx.as_mut(), tenant_id, period_id).await;
                finish(tx, reversed).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(Reversal::Deleted { period, invoice_id }) => {
                info!(invoice_id = %invoice_id, "draft invoice reversed");
                metrics::record_invoice_reversed(&tenant_id.to_string());
                self.publish(
                    tenant_id,
                    vec![ScheduleEvent::InvoiceReversed {
                        work_order_id: period.work_order_id,
                        period_id,
                        invoice_id,
                        on: today,
                    }],
                );
                ReversalOutcome::Deleted { invoice_id }
            }
            Ok(Reversal::Retained { invoice_id, status }) => {
                warn!(
                    invoice_id = %invoice_id,
                    status = status.as_str(),
                    reason = "invoice_not_draft",
                    "period reopened but its invoice is no longer a draft; keeping it"
                );
                ReversalOutcome::Retained { invoice_id, status }
            }
            Ok(Reversal::Cleared) => {
                warn!(reason = "invoice_missing", "cleared billing of period with no invoice");
                ReversalOutcome::Cleared
            }
            Ok(Reversal::Nothing) => ReversalOutcome::NothingToReverse,
            Err(err) => {
                report_failure("reverse_billing", tenant_id, &err);
                ReversalOutcome::Failed(err)
            }
        }
    }
}

async fn reverse_in(
    tx: &mut dyn ScheduleTx,
    tenant_id: TenantId,
    period_id: PeriodId,
) -> Result<Reversal, EngineError> {
    let work_order_id = tx
        .period(tenant_id, period_id)
        .await?
        .ok_or_else(|| EngineError::not_found("period", period_id))?
        .work_order_id;
    tx.lock_work_order(tenant_id, work_order_id).await?;
    let mut period = tx
        .lock_period(tenant_id, period_id)
        .await?
        .ok_or_else(|| EngineError::not_found("period", period_id))?;

    // Completed again by a concurrent write.
    if period.is_completed() || !period.has_billing() {
        return Ok(Reversal::Nothing);
    }

    let Some(invoice_id) = period.invoice_id else {
        period.clear_billing();
        tx.update_period(&period).await?;
        return Ok(Reversal::Cleared);
    };

    match tx.invoice(tenant_id, invoice_id).await? {
        None => {
            period.clear_billing();
            tx.update_period(&period).await?;
            Ok(Reversal::Cleared)
        }
        Some(invoice) if invoice.is_reversible() => {
            tx.delete_invoice(tenant_id, invoice_id).await?;
            period.clear_billing();
            tx.update_period(&period).await?;
            Ok(Reversal::Deleted { period, invoice_id })
        }
        Some(invoice) => Ok(Reversal::Retained {
            invoice_id,
            status: invoice.status,
        }),
    }
}
