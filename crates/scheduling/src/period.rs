//! Materialized periods, their task instances and completion roll-up.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::{
    Entity, InvoiceId, Money, PeriodId, TaskInstanceId, TaskTemplateId, TenantId, UserId,
    WorkOrderId,
};

use crate::calendar::PeriodWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Pending,
    InProgress,
    Completed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Pending => "pending",
            PeriodStatus::InProgress => "in_progress",
            PeriodStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PeriodStatus::Pending),
            "in_progress" => Some(PeriodStatus::InProgress),
            "completed" => Some(PeriodStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// Task counts for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionTally {
    pub total: u32,
    pub completed: u32,
}

impl CompletionTally {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut tally, status| {
            tally.total += 1;
            if status == TaskStatus::Completed {
                tally.completed += 1;
            }
            tally
        })
    }

    pub fn status(&self) -> PeriodStatus {
        if self.total > 0 && self.completed >= self.total {
            PeriodStatus::Completed
        } else if self.completed > 0 {
            PeriodStatus::InProgress
        } else {
            PeriodStatus::Pending
        }
    }
}

/// How a period's status moved after a recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodTransition {
    Unchanged,
    /// Moved between `pending` and `in_progress`.
    Advanced,
    /// Moved into `completed`.
    Completed,
    /// Moved out of `completed`.
    Reopened,
}

impl PeriodTransition {
    pub fn between(before: PeriodStatus, after: PeriodStatus) -> Self {
        match (before, after) {
            (b, a) if b == a => PeriodTransition::Unchanged,
            (_, PeriodStatus::Completed) => PeriodTransition::Completed,
            (PeriodStatus::Completed, _) => PeriodTransition::Reopened,
            _ => PeriodTransition::Advanced,
        }
    }
}

/// One instantiated cycle of a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub tenant_id: TenantId,
    pub work_order_id: WorkOrderId,
    pub name: String,
    /// Canonical cycle identifier, e.g. `2025-Q4`.
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: PeriodStatus,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub billed: bool,
    pub invoice_id: Option<InvoiceId>,
    /// Period-specific price; takes precedence over the work order amount.
    pub billing_amount_override: Option<Money>,
}

impl Period {
    pub fn from_window(
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        window: &PeriodWindow,
        total_tasks: u32,
    ) -> Self {
        Self {
            id: PeriodId::new(),
            tenant_id,
            work_order_id,
            name: window.name(),
            key: window.key(),
            start: window.start(),
            end: window.end(),
            status: PeriodStatus::Pending,
            total_tasks,
            completed_tasks: 0,
            billed: false,
            invoice_id: None,
            billing_amount_override: None,
        }
    }

    pub fn tally(&self) -> CompletionTally {
        CompletionTally {
            total: self.total_tasks,
            completed: self.completed_tasks,
        }
    }

    /// Replace the counts and recompute the status.
    pub fn apply_tally(&mut self, tally: CompletionTally) -> PeriodTransition {
        let before = self.status;
        self.total_tasks = tally.total;
        self.completed_tasks = tally.completed;
        self.status = tally.status();
        PeriodTransition::between(before, self.status)
    }

    pub fn is_completed(&self) -> bool {
        self.status == PeriodStatus::Completed
    }

    /// Billed or linked to an invoice. Billing must not fire again.
    pub fn has_billing(&self) -> bool {
        self.billed || self.invoice_id.is_some()
    }

    pub fn mark_billed(&mut self, invoice_id: InvoiceId) {
        self.billed = true;
        self.invoice_id = Some(invoice_id);
    }

    pub fn clear_billing(&mut self) {
        self.billed = false;
        self.invoice_id = None;
    }
}

impl Entity for Period {
    type Id = PeriodId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// One concrete occurrence of a task template inside a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskInstanceId,
    pub tenant_id: TenantId,
    pub period_id: PeriodId,
    pub template_id: TaskTemplateId,
    pub title: String,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub assignee: Option<UserId>,
    pub completed_on: Option<NaiveDate>,
}

impl TaskInstance {
    /// Returns `false` when the status was already `status`.
    pub fn set_status(&mut self, status: TaskStatus, today: NaiveDate) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.completed_on = match status {
            TaskStatus::Completed => Some(today),
            TaskStatus::Pending => None,
        };
        true
    }
}

impl Entity for TaskInstance {
    type Id = TaskInstanceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
