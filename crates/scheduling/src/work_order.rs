//! Recurring work orders.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::{
    CustomerId, DomainError, DomainResult, Entity, Money, ServiceId, TenantId, UserId, WorkOrderId,
};

use crate::calendar::{PeriodWindow, calculate};
use crate::recurrence::{PeriodOffset, RecurrencePattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Active => "active",
            WorkOrderStatus::OnHold => "on_hold",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(WorkOrderStatus::Active),
            "on_hold" => Some(WorkOrderStatus::OnHold),
            "completed" => Some(WorkOrderStatus::Completed),
            "cancelled" => Some(WorkOrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// A recurring obligation for one customer and one service.
///
/// The recurrence pattern is private: it may only change through
/// [`WorkOrder::change_pattern`], which refuses once periods exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub service_id: ServiceId,
    pattern: RecurrencePattern,
    pub offset: PeriodOffset,
    pub anchor_start: NaiveDate,
    pub assignee: Option<UserId>,
    pub billing_amount: Option<Money>,
    pub auto_bill: bool,
    pub status: WorkOrderStatus,
}

impl WorkOrder {
    pub fn new(
        tenant_id: TenantId,
        customer_id: CustomerId,
        service_id: ServiceId,
        pattern: RecurrencePattern,
        anchor_start: NaiveDate,
    ) -> Self {
        Self {
            id: WorkOrderId::new(),
            tenant_id,
            customer_id,
            service_id,
            pattern,
            offset: PeriodOffset::Current,
            anchor_start,
            assignee: None,
            billing_amount: None,
            auto_bill: true,
            status: WorkOrderStatus::Active,
        }
    }

    pub fn pattern(&self) -> RecurrencePattern {
        self.pattern
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkOrderStatus::Active
    }

    /// First cycle of this work order: the cycle selected by `offset` relative to
    /// the anchor date.
    pub fn first_window(&self) -> PeriodWindow {
        calculate(self.pattern, self.anchor_start, self.offset)
    }

    pub fn change_pattern(
        &mut self,
        pattern: RecurrencePattern,
        periods_exist: bool,
    ) -> DomainResult<()> {
        if pattern == self.pattern {
            return Ok(());
        }
        if periods_exist {
            return Err(DomainError::invariant(format!(
                "work order {} already has periods; its recurrence pattern is fixed",
                self.id
            )));
        }
        self.pattern = pattern;
        Ok(())
    }
}

impl Entity for WorkOrder {
    type Id = WorkOrderId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
