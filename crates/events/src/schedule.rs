//! Facts published by the scheduling engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::{InvoiceId, Money, PeriodId, WorkOrderId};

use crate::event::Event;

/// Why billing did not produce an invoice.
///
/// Each variant is a silent no-op at the engine boundary; the label is what
/// shows up in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PeriodNotCompleted,
    AlreadyBilled,
    WorkOrderNotFound,
    AutoBillDisabled,
    ServiceNotFound,
    CustomerNotFound,
    NoIncomeAccount,
    IncomeAccountNotRevenue,
    NoPrice,
    NoReceivableAccount,
    ReceivableAccountNotAsset,
    NoNumberingConfig,
    InvalidNumberingConfig,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::PeriodNotCompleted => "period_not_completed",
            SkipReason::AlreadyBilled => "already_billed",
            SkipReason::WorkOrderNotFound => "work_order_not_found",
            SkipReason::AutoBillDisabled => "auto_bill_disabled",
            SkipReason::ServiceNotFound => "service_not_found",
            SkipReason::CustomerNotFound => "customer_not_found",
            SkipReason::NoIncomeAccount => "no_income_account",
            SkipReason::IncomeAccountNotRevenue => "income_account_not_revenue",
            SkipReason::NoPrice => "no_price",
            SkipReason::NoReceivableAccount => "no_receivable_account",
            SkipReason::ReceivableAccountNotAsset => "receivable_account_not_asset",
            SkipReason::NoNumberingConfig => "no_numbering_config",
            SkipReason::InvalidNumberingConfig => "invalid_numbering_config",
        }
    }

    /// Missing or inconsistent tenant configuration, as opposed to a period
    /// that simply has nothing to bill.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SkipReason::NoIncomeAccount
                | SkipReason::IncomeAccountNotRevenue
                | SkipReason::NoReceivableAccount
                | SkipReason::ReceivableAccountNotAsset
                | SkipReason::NoNumberingConfig
                | SkipReason::InvalidNumberingConfig
        )
    }
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleEvent {
    PeriodMaterialized {
        work_order_id: WorkOrderId,
        period_id: PeriodId,
        key: String,
        start: NaiveDate,
        end: NaiveDate,
        task_count: u32,
        on: NaiveDate,
    },
    PeriodCompleted {
        work_order_id: WorkOrderId,
        period_id: PeriodId,
        on: NaiveDate,
    },
    PeriodReopened {
        work_order_id: WorkOrderId,
        period_id: PeriodId,
        on: NaiveDate,
    },
    InvoiceDrafted {
        work_order_id: WorkOrderId,
        period_id: PeriodId,
        invoice_id: InvoiceId,
        number: String,
        total: Money,
        on: NaiveDate,
    },
    InvoiceReversed {
        work_order_id: WorkOrderId,
        period_id: PeriodId,
        invoice_id: InvoiceId,
        on: NaiveDate,
    },
    BillingSkipped {
        period_id: PeriodId,
        reason: SkipReason,
        on: NaiveDate,
    },
}

impl Event for ScheduleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ScheduleEvent::PeriodMaterialized { .. } => "schedule.period.materialized",
            ScheduleEvent::PeriodCompleted { .. } => "schedule.period.completed",
            ScheduleEvent::PeriodReopened { .. } => "schedule.period.reopened",
            ScheduleEvent::InvoiceDrafted { .. } => "schedule.invoice.drafted",
            ScheduleEvent::InvoiceReversed { .. } => "schedule.invoice.reversed",
            ScheduleEvent::BillingSkipped { .. } => "schedule.billing.skipped",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_on(&self) -> NaiveDate {
        match self {
            ScheduleEvent::PeriodMaterialized { on, .. }
            | ScheduleEvent::PeriodCompleted { on, .. }
            | ScheduleEvent::PeriodReopened { on, .. }
            | ScheduleEvent::InvoiceDrafted { on, .. }
            | ScheduleEvent::InvoiceReversed { on, .. }
            | ScheduleEvent::BillingSkipped { on, .. } => *on,
        }
    }
}
