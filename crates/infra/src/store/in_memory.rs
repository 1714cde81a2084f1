//! In-memory schedule store for tests/dev.
//!
//! Transactions are serialized: `begin()` takes an owned lock on the whole
//! state and works on a copy; `commit()` writes the copy back. The same
//! uniqueness keys as the SQL schema are enforced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use cadence_core::{
    CustomerId, InvoiceId, PeriodId, ServiceId, TaskInstanceId, TaskTemplateId, TenantId,
    WorkOrderId,
};
use cadence_invoicing::{Customer, DocumentKind, Invoice, TenantBillingSettings};
use cadence_scheduling::{
    Period, PeriodStatus, ServiceTemplate, TaskInstance, TaskTemplate, WorkOrder,
};

use super::r#trait::{ScheduleStore, ScheduleTx, StoreError, WorkOrderProgress};

#[derive(Debug, Clone, Default)]
struct State {
    work_orders: HashMap<WorkOrderId, WorkOrder>,
    services: HashMap<ServiceId, (TenantId, ServiceTemplate)>,
    templates: HashMap<TaskTemplateId, (TenantId, TaskTemplate)>,
    customers: HashMap<CustomerId, (TenantId, Customer)>,
    settings: HashMap<TenantId, TenantBillingSettings>,

    periods: HashMap<PeriodId, Period>,
    period_keys: HashSet<(WorkOrderId, NaiveDate, NaiveDate)>,

    tasks: HashMap<TaskInstanceId, TaskInstance>,
    task_keys: HashSet<(PeriodId, TaskTemplateId, NaiveDate)>,

    invoices: HashMap<InvoiceId, Invoice>,
    invoice_numbers: HashSet<(TenantId, String)>,

    counters: HashMap<(TenantId, DocumentKind), u64>,
}

impl State {
    fn invoice_key_taken(&self, invoice: &Invoice) -> bool {
        match (invoice.work_order_id, invoice.period_id) {
            (Some(wo), Some(period)) => self
                .invoices
                .values()
                .any(|i| i.work_order_id == Some(wo) && i.period_id == Some(period)),
            _ => false,
        }
    }
}

/// In-memory [`ScheduleStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_work_order(&self, work_order: WorkOrder) {
        self.state
            .lock()
            .await
            .work_orders
            .insert(work_order.id, work_order);
    }

    pub async fn put_service(&self, tenant_id: TenantId, service: ServiceTemplate) {
        self.state
            .lock()
            .await
            .services
            .insert(service.id, (tenant_id, service));
    }

    pub async fn put_task_template(&self, tenant_id: TenantId, template: TaskTemplate) {
        self.state
            .lock()
            .await
            .templates
            .insert(template.id, (tenant_id, template));
    }

    pub async fn put_customer(&self, tenant_id: TenantId, customer: Customer) {
        self.state
            .lock()
            .await
            .customers
            .insert(customer.id, (tenant_id, customer));
    }

    pub async fn put_billing_settings(&self, settings: TenantBillingSettings) {
        self.state
            .lock()
            .await
            .settings
            .insert(settings.tenant_id, settings);
    }

    /// Overwrite a stored invoice (e.g. after the ledger subsystem sent it).
    pub async fn put_invoice(&self, invoice: Invoice) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.invoices.contains_key(&invoice.id) {
            return Err(StoreError::NotFound(format!("invoice {}", invoice.id)));
        }
        state.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    /// Every invoice of a tenant, ordered by number.
    pub async fn invoices(&self, tenant_id: TenantId) -> Vec<Invoice> {
        let state = self.state.lock().await;
        let mut out: Vec<_> = state
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.number.cmp(&b.number));
        out
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }

    async fn active_work_orders(&self) -> Result<Vec<(TenantId, WorkOrderId)>, StoreError> {
        let state = self.state.lock().await;
        let mut out: Vec<_> = state
            .work_orders
            .values()
            .filter(|wo| wo.is_active())
            .map(|wo| (wo.tenant_id, wo.id))
            .collect();
        out.sort();
        Ok(out)
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn scoped<T: Clone>(entry: Option<&(TenantId, T)>, tenant_id: TenantId) -> Option<T> {
    entry
        .filter(|(owner, _)| *owner == tenant_id)
        .map(|(_, value)| value.clone())
}

#[async_trait]
impl ScheduleTx for InMemoryTx {
    async fn lock_work_order(
        &mut self,
        tenant_id: TenantId,
        id: WorkOrderId,
    ) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self
            .working
            .work_orders
            .get(&id)
            .filter(|wo| wo.tenant_id == tenant_id)
            .cloned())
    }

    async fn service(
        &mut self,
        tenant_id: TenantId,
        id: ServiceId,
    ) -> Result<Option<ServiceTemplate>, StoreError> {
        Ok(scoped(self.working.services.get(&id), tenant_id))
    }

    async fn task_templates(
        &mut self,
        tenant_id: TenantId,
        service_id: ServiceId,
    ) -> Result<Vec<TaskTemplate>, StoreError> {
        let mut out: Vec<_> = self
            .working
            .templates
            .values()
            .filter(|(owner, t)| *owner == tenant_id && t.service_id == service_id)
            .map(|(_, t)| t.clone())
            .collect();
        out.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn customer(
        &mut self,
        tenant_id: TenantId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(scoped(self.working.customers.get(&id), tenant_id))
    }

    async fn billing_settings(
        &mut self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantBillingSettings>, StoreError> {
        Ok(self.working.settings.get(&tenant_id).cloned())
    }

    async fn periods_for_work_order(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<Vec<Period>, StoreError> {
        let mut out: Vec<_> = self
            .working
            .periods
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.work_order_id == work_order_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.start);
        Ok(out)
    }

    async fn period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError> {
        Ok(self
            .working
            .periods
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn lock_period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError> {
        self.period(tenant_id, id).await
    }

    async fn insert_period(&mut self, period: &Period) -> Result<bool, StoreError> {
        let key = (period.work_order_id, period.start, period.end);
        if self.working.period_keys.contains(&key) {
            return Ok(false);
        }
        let overlaps = self.working.periods.values().any(|p| {
            p.work_order_id == period.work_order_id && p.start <= period.end && period.start <= p.end
        });
        if overlaps {
            return Err(StoreError::UniqueViolation(format!(
                "period {}..{} overlaps an existing period of work order {}",
                period.start, period.end, period.work_order_id
            )));
        }
        self.working.period_keys.insert(key);
        self.working.periods.insert(period.id, period.clone());
        Ok(true)
    }

    async fn update_period(&mut self, period: &Period) -> Result<(), StoreError> {
        match self.working.periods.get_mut(&period.id) {
            Some(existing) if existing.tenant_id == period.tenant_id => {
                *existing = period.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("period {}", period.id))),
        }
    }

    async fn insert_task_instance(&mut self, task: &TaskInstance) -> Result<bool, StoreError> {
        if !self.working.periods.contains_key(&task.period_id) {
            return Err(StoreError::NotFound(format!("period {}", task.period_id)));
        }
        let key = (task.period_id, task.template_id, task.due_date);
        if !self.working.task_keys.insert(key) {
            return Ok(false);
        }
        self.working.tasks.insert(task.id, task.clone());
        Ok(true)
    }

    async fn task_instance(
        &mut self,
        tenant_id: TenantId,
        id: TaskInstanceId,
    ) -> Result<Option<TaskInstance>, StoreError> {
        Ok(self
            .working
            .tasks
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_task_instance(&mut self, task: &TaskInstance) -> Result<(), StoreError> {
        match self.working.tasks.get_mut(&task.id) {
            Some(existing) if existing.tenant_id == task.tenant_id => {
                *existing = task.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("task instance {}", task.id))),
        }
    }

    async fn tasks_for_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Vec<TaskInstance>, StoreError> {
        let mut out: Vec<_> = self
            .working
            .tasks
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.period_id == period_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.title.cmp(&b.title)));
        Ok(out)
    }

    async fn invoice(
        &mut self,
        tenant_id: TenantId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .working
            .invoices
            .get(&id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned())
    }

    async fn invoice_for_period(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        period_id: PeriodId,
    ) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .working
            .invoices
            .values()
            .find(|i| {
                i.tenant_id == tenant_id
                    && i.work_order_id == Some(work_order_id)
                    && i.period_id == Some(period_id)
            })
            .cloned())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<bool, StoreError> {
        if self.working.invoice_key_taken(invoice) {
            return Ok(false);
        }
        let number_key = (invoice.tenant_id, invoice.number.clone());
        if self.working.invoice_numbers.contains(&number_key) {
            return Err(StoreError::UniqueViolation(format!(
                "invoice number {} already used",
                invoice.number
            )));
        }
        self.working.invoice_numbers.insert(number_key);
        self.working.invoices.insert(invoice.id, invoice.clone());
        Ok(true)
    }

    async fn delete_invoice(
        &mut self,
        tenant_id: TenantId,
        id: InvoiceId,
    ) -> Result<(), StoreError> {
        match self.working.invoices.get(&id) {
            Some(invoice) if invoice.tenant_id == tenant_id => {
                let number_key = (tenant_id, invoice.number.clone());
                self.working.invoice_numbers.remove(&number_key);
                self.working.invoices.remove(&id);
                for period in self.working.periods.values_mut() {
                    if period.invoice_id == Some(id) {
                        period.invoice_id = None;
                    }
                }
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("invoice {id}"))),
        }
    }

    async fn next_document_sequence(
        &mut self,
        tenant_id: TenantId,
        kind: DocumentKind,
    ) -> Result<u64, StoreError> {
        let counter = self.working.counters.entry((tenant_id, kind)).or_insert(0);
        let index = *counter;
        *counter += 1;
        Ok(index)
    }

    async fn work_order_progress(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<WorkOrderProgress, StoreError> {
        let progress = self
            .working
            .periods
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.work_order_id == work_order_id)
            .fold(WorkOrderProgress::default(), |mut acc, p| {
                acc.periods += 1;
                if p.status == PeriodStatus::Completed {
                    acc.completed += 1;
                }
                if p.billed {
                    acc.billed += 1;
                }
                acc
            });
        Ok(progress)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
