use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use cadence_core::{
    CustomerId, InvoiceId, PeriodId, ServiceId, TaskInstanceId, TenantId, WorkOrderId,
};
use cadence_invoicing::{Customer, DocumentKind, Invoice, TenantBillingSettings};
use cadence_scheduling::{Period, ServiceTemplate, TaskInstance, TaskTemplate, WorkOrder};

/// Persistence error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or exclusion constraint rejected the write.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A stored row could not be turned back into a domain value.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Work-order roll-up for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOrderProgress {
    pub periods: u32,
    pub completed: u32,
    pub billed: u32,
}

/// Entry point to the schedule store.
///
/// Every engine step runs inside exactly one [`ScheduleTx`].
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError>;

    /// Every active work order, across tenants. Used by the daily sweep.
    async fn active_work_orders(&self) -> Result<Vec<(TenantId, WorkOrderId)>, StoreError>;
}

#[async_trait]
impl<S> ScheduleStore for Arc<S>
where
    S: ScheduleStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError> {
        (**self).begin().await
    }

    async fn active_work_orders(&self) -> Result<Vec<(TenantId, WorkOrderId)>, StoreError> {
        (**self).active_work_orders().await
    }
}

/// One store transaction.
///
/// Dropping a transaction without calling [`ScheduleTx::commit`] discards its
/// writes. Row locks are taken on work orders before periods, never the other
/// way round. Every read is tenant-scoped.
#[async_trait]
pub trait ScheduleTx: Send {
    /// Load and lock a work order for the rest of the transaction.
    async fn lock_work_order(
        &mut self,
        tenant_id: TenantId,
        id: WorkOrderId,
    ) -> Result<Option<WorkOrder>, StoreError>;

    async fn service(
        &mut self,
        tenant_id: TenantId,
        id: ServiceId,
    ) -> Result<Option<ServiceTemplate>, StoreError>;

    async fn task_templates(
        &mut self,
        tenant_id: TenantId,
        service_id: ServiceId,
    ) -> Result<Vec<TaskTemplate>, StoreError>;

    async fn customer(
        &mut self,
        tenant_id: TenantId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError>;

    async fn billing_settings(
        &mut self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantBillingSettings>, StoreError>;

    /// Periods of a work order ordered by start date.
    async fn periods_for_work_order(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<Vec<Period>, StoreError>;

    /// Read a period without locking it.
    async fn period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError>;

    /// Load and lock a period. Lock its work order first.
    async fn lock_period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError>;

    /// Insert a period. Returns `false` when `(work_order, start, end)` already
    /// exists.
    async fn insert_period(&mut self, period: &Period) -> Result<bool, StoreError>;

    async fn update_period(&mut self, period: &Period) -> Result<(), StoreError>;

    /// Insert a task instance. Returns `false` when `(period, template, due)`
    /// already exists.
    async fn insert_task_instance(&mut self, task: &TaskInstance) -> Result<bool, StoreError>;

    async fn task_instance(
        &mut self,
        tenant_id: TenantId,
        id: TaskInstanceId,
    ) -> Result<Option<TaskInstance>, StoreError>;

    async fn update_task_instance(&mut self, task: &TaskInstance) -> Result<(), StoreError>;

    async fn tasks_for_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Vec<TaskInstance>, StoreError>;

    async fn invoice(
        &mut self,
        tenant_id: TenantId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError>;

    async fn invoice_for_period(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        period_id: PeriodId,
    ) -> Result<Option<Invoice>, StoreError>;

    /// Insert an invoice with its lines. Returns `false` when an invoice for
    /// the same `(work_order, period)` already exists.
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<bool, StoreError>;

    async fn delete_invoice(&mut self, tenant_id: TenantId, id: InvoiceId)
    -> Result<(), StoreError>;

    /// Atomically take the next zero-based sequence index for a tenant's
    /// document kind. Indexes taken by rolled-back transactions are reused;
    /// indexes of deleted documents are not.
    async fn next_document_sequence(
        &mut self,
        tenant_id: TenantId,
        kind: DocumentKind,
    ) -> Result<u64, StoreError>;

    async fn work_order_progress(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<WorkOrderProgress, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
