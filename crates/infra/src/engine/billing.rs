use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use cadence_core::{InvoiceId, Money, PeriodId, TenantId};
use cadence_events::{EventBus, ScheduleEvent, SkipReason};
use cadence_invoicing::{
    AccountResolutionError, DocumentKind, Invoice, InvoiceDraft, TenantBillingSettings,
    format_number, resolve_income_account, resolve_price, resolve_receivable_account,
};
use cadence_observability::metrics;
use cadence_scheduling::Period;

use super::{Engine, EngineError, ScheduleEnvelope, finish, report_failure};
use crate::store::{ScheduleStore, ScheduleTx};

/// Result of one billing attempt for a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingOutcome {
    Drafted {
        invoice_id: InvoiceId,
        number: String,
        total: Money,
    },
    /// An invoice for the period already existed and was linked.
    Linked { invoice_id: InvoiceId },
    Skipped(SkipReason),
    Failed(EngineError),
}

impl BillingOutcome {
    pub fn invoice_id(&self) -> Option<InvoiceId> {
        match self {
            BillingOutcome::Drafted { invoice_id, .. } | BillingOutcome::Linked { invoice_id } => {
                Some(*invoice_id)
            }
            BillingOutcome::Skipped(_) | BillingOutcome::Failed(_) => None,
        }
    }
}

enum BillingStep {
    Drafted { period: Period, invoice: Invoice },
    Linked(InvoiceId),
    Skipped(SkipReason),
}

impl<S, B> Engine<S, B>
where
    S: ScheduleStore,
    B: EventBus<ScheduleEnvelope>,
{
    /// Raise a draft invoice for a completed period.
    ///
    /// Runs automatically when a period completes; callable again to retry once
    /// configuration is fixed. A period is billed at most once.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period_id = %period_id))]
    pub async fn bill_period(
        &self,
        tenant_id: TenantId,
        period_id: PeriodId,
        today: NaiveDate,
    ) -> BillingOutcome {
        let result = match self.store.begin().await {
            Ok(mut tx) => {
                let billed = self.bill_in(tx.as_mut(), tenant_id, period_id, today).await;
                finish(tx, billed).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(BillingStep::Drafted { period, invoice }) => {
                info!(
                    invoice_id = %invoice.id,
                    number = %invoice.number,
                    total = %invoice.total,
                    "draft invoice raised"
                );
                metrics::record_invoice_drafted(&tenant_id.to_string());
                self.publish(
                    tenant_id,
                    vec![ScheduleEvent::InvoiceDrafted {
                        work_order_id: period.work_order_id,
                        period_id,
                        invoice_id: invoice.id,
                        number: invoice.number.clone(),
                        total: invoice.total,
                        on: today,
                    }],
                );
                BillingOutcome::Drafted {
                    invoice_id: invoice.id,
                    number: invoice.number,
                    total: invoice.total,
                }
            }
            Ok(BillingStep::Linked(invoice_id)) => {
                info!(invoice_id = %invoice_id, "linked existing invoice to period");
                BillingOutcome::Linked { invoice_id }
            }
            Ok(BillingStep::Skipped(reason)) => {
                warn!(
                    reason = reason.as_str(),
                    configuration = reason.is_configuration(),
                    "billing skipped"
                );
                metrics::record_billing_skipped(reason.as_str());
                self.publish(
                    tenant_id,
                    vec![ScheduleEvent::BillingSkipped {
                        period_id,
                        reason,
                        on: today,
                    }],
                );
                BillingOutcome::Skipped(reason)
            }
            Err(err) => {
                report_failure("bill_period", tenant_id, &err);
                BillingOutcome::Failed(err)
            }
        }
    }

    async fn bill_in(
        &self,
        tx: &mut dyn ScheduleTx,
        tenant_id: TenantId,
        period_id: PeriodId,
        today: NaiveDate,
    ) -> Result<BillingStep, EngineError> {
        let work_order_id = tx
            .period(tenant_id, period_id)
            .await?
            .ok_or_else(|| EngineError::not_found("period", period_id))?
            .work_order_id;
        let work_order = tx.lock_work_order(tenant_id, work_order_id).await?;
        let mut period = tx
            .lock_period(tenant_id, period_id)
            .await?
            .ok_or_else(|| EngineError::not_found("period", period_id))?;

        if !period.is_completed() {
            return Ok(BillingStep::Skipped(SkipReason::PeriodNotCompleted));
        }
        if period.has_billing() {
            return Ok(BillingStep::Skipped(SkipReason::AlreadyBilled));
        }
        let Some(work_order) = work_order else {
            return Ok(BillingStep::Skipped(SkipReason::WorkOrderNotFound));
        };
        if !work_order.auto_bill {
            return Ok(BillingStep::Skipped(SkipReason::AutoBillDisabled));
        }

        if let Some(existing) = tx
            .invoice_for_period(tenant_id, work_order.id, period_id)
            .await?
        {
            period.mark_billed(existing.id);
            tx.update_period(&period).await?;
            return Ok(BillingStep::Linked(existing.id));
        }

        let Some(service) = tx.service(tenant_id, work_order.service_id).await? else {
            return Ok(BillingStep::Skipped(SkipReason::ServiceNotFound));
        };
        let settings = tx
            .billing_settings(tenant_id)
            .await?
            .unwrap_or_else(|| TenantBillingSettings::empty(tenant_id));

        let income_account = match resolve_income_account(
            service.income_account.as_ref(),
            settings.default_income_account.as_ref(),
        ) {
            Ok(account) => account,
            Err(AccountResolutionError::Missing) => {
                return Ok(BillingStep::Skipped(SkipReason::NoIncomeAccount));
            }
            Err(AccountResolutionError::WrongKind { .. }) => {
                return Ok(BillingStep::Skipped(SkipReason::IncomeAccountNotRevenue));
            }
        };

        let Some(unit_price) = resolve_price(
            period.billing_amount_override,
            work_order.billing_amount,
            service.default_price,
        ) else {
            return Ok(BillingStep::Skipped(SkipReason::NoPrice));
        };

        let Some(customer) = tx.customer(tenant_id, work_order.customer_id).await? else {
            return Ok(BillingStep::Skipped(SkipReason::CustomerNotFound));
        };
        let receivable_account = match resolve_receivable_account(
            customer.account.as_ref(),
            settings.default_receivable_account.as_ref(),
        ) {
            Ok(account) => account,
            Err(AccountResolutionError::Missing) => {
                return Ok(BillingStep::Skipped(SkipReason::NoReceivableAccount));
            }
            Err(AccountResolutionError::WrongKind { .. }) => {
                return Ok(BillingStep::Skipped(SkipReason::ReceivableAccountNotAsset));
            }
        };

        let Some(numbering) = settings.invoice_numbering else {
            return Ok(BillingStep::Skipped(SkipReason::NoNumberingConfig));
        };
        if numbering.validate().is_err() {
            return Ok(BillingStep::Skipped(SkipReason::InvalidNumberingConfig));
        }

        let sequence = tx
            .next_document_sequence(tenant_id, DocumentKind::Invoice)
            .await?;
        let number = format_number(&numbering, sequence);

        let invoice = InvoiceDraft {
            tenant_id,
            customer_id: customer.id,
            work_order_id: work_order.id,
            period_id,
            service_id: service.id,
            description: format!("{} - {}", service.name, period.name),
            unit_price,
            tax_rate_bp: service.tax_rate_bp,
            issue_date: today,
            payment_terms_days: service
                .payment_terms_days
                .unwrap_or(self.config.default_payment_terms_days),
            income_account,
            receivable_account,
        }
        .into_invoice(number)?;

        if !tx.insert_invoice(&invoice).await? {
            let existing = tx
                .invoice_for_period(tenant_id, work_order.id, period_id)
                .await?
                .ok_or_else(|| {
                    EngineError::IdempotencyConflict(format!(
                        "invoice for period {period_id} vanished during insert"
                    ))
                })?;
            period.mark_billed(existing.id);
            tx.update_period(&period).await?;
            return Ok(BillingStep::Linked(existing.id));
        }

        period.mark_billed(invoice.id);
        tx.update_period(&period).await?;
        Ok(BillingStep::Drafted { period, invoice })
    }
}
