//! Postgres-backed schedule store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (exclusion violation) | `23P01` | `UniqueViolation` |
//! | Database (other) | any other | `Storage` |
//! | PoolClosed, network, other | n/a | `Storage` |
//!
//! Row locks are taken with `SELECT ... FOR UPDATE`, work orders before
//! periods. The `ON CONFLICT DO NOTHING` inserts make re-running a step a no-op.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use cadence_core::{
    AccountKind, CustomerId, InvoiceId, LedgerAccount, Money, PeriodId, ServiceId,
    TaskInstanceId, TaskTemplateId, TenantId, UserId, WorkOrderId,
};
use cadence_invoicing::{
    Customer, DocumentKind, Invoice, InvoiceLine, InvoiceStatus, NumberingConfig,
    TenantBillingSettings,
};
use cadence_scheduling::{
    DueDatePolicy, Period, PeriodOffset, PeriodStatus, RecurrencePattern, ServiceTemplate,
    TaskInstance, TaskStatus, TaskTemplate, WorkOrder, WorkOrderStatus,
};

use super::r#trait::{ScheduleStore, ScheduleTx, StoreError, WorkOrderProgress};
use crate::config::EngineConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_recurring_schedule.sql");

/// Postgres [`ScheduleStore`].
#[derive(Debug, Clone)]
pub struct PostgresScheduleStore {
    pool: PgPool,
}

impl PostgresScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `database_url` and `db_max_connections` from the config.
    pub async fn connect(config: &EngineConfig) -> Result<Self, StoreError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Storage("no database url configured".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScheduleStore for PostgresScheduleStore {
    async fn begin(&self) -> Result<Box<dyn ScheduleTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgScheduleTx { tx }))
    }

    #[instrument(skip(self), err)]
    async fn active_work_orders(&self) -> Result<Vec<(TenantId, WorkOrderId)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, id
            FROM work_orders
            WHERE status = 'active'
            ORDER BY tenant_id, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_work_orders", e))?;

        rows.iter()
            .map(|row| {
                let tenant: Uuid = row.try_get("tenant_id").map_err(decode_error)?;
                let id: Uuid = row.try_get("id").map_err(decode_error)?;
                Ok((TenantId::from_uuid(tenant), WorkOrderId::from_uuid(id)))
            })
            .collect()
    }
}

struct PgScheduleTx {
    tx: Transaction<'static, Postgres>,
}

impl PgScheduleTx {
    async fn invoice_lines(&mut self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT description, quantity, unit_price_minor, amount_minor,
                   tax_rate_bp, tax_minor, service_id
            FROM invoice_lines
            WHERE invoice_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("invoice_lines", e))?;

        rows.iter()
            .map(|row| {
                let line = InvoiceLineRow::from_row(row).map_err(decode_error)?;
                line.try_into()
            })
            .collect()
    }

    async fn hydrate_invoice(&mut self, row: Option<PgRow>) -> Result<Option<Invoice>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let header = InvoiceRow::from_row(&row).map_err(decode_error)?;
        let lines = self.invoice_lines(header.id).await?;
        header.into_invoice(lines).map(Some)
    }
}

const WORK_ORDER_COLUMNS: &str = "id, tenant_id, customer_id, service_id, recurrence_pattern, \
     period_offset, anchor_start, assignee, billing_amount_minor, auto_bill, status";

const PERIOD_COLUMNS: &str = "id, tenant_id, work_order_id, name, period_key, start_date, \
     end_date, status, total_tasks, completed_tasks, billed, invoice_id, \
     billing_amount_override_minor";

const TASK_COLUMNS: &str =
    "id, tenant_id, period_id, template_id, title, due_date, status, assignee, completed_on";

const INVOICE_COLUMNS: &str = "id, tenant_id, customer_id, work_order_id, period_id, number, \
     issue_date, due_date, subtotal_minor, tax_minor, total_minor, status, \
     income_account_code, income_account_kind, receivable_account_code, receivable_account_kind";

#[async_trait]
impl ScheduleTx for PgScheduleTx {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, work_order_id = %id), err)]
    async fn lock_work_order(
        &mut self,
        tenant_id: TenantId,
        id: WorkOrderId,
    ) -> Result<Option<WorkOrder>, StoreError> {
        let sql = format!(
            "SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_work_order", e))?;

        row.map(|row| WorkOrderRow::from_row(&row).map_err(decode_error)?.try_into())
            .transpose()
    }

    async fn service(
        &mut self,
        tenant_id: TenantId,
        id: ServiceId,
    ) -> Result<Option<ServiceTemplate>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, default_price_minor, tax_rate_bp, income_account_code,
                   income_account_kind, payment_terms_days, is_active
            FROM services
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("service", e))?;

        row.map(|row| ServiceRow::from_row(&row).map_err(decode_error)?.try_into())
            .transpose()
    }

    async fn task_templates(
        &mut self,
        tenant_id: TenantId,
        service_id: ServiceId,
    ) -> Result<Vec<TaskTemplate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, service_id, title, description, is_active, frequency, due_policy,
                   sort_order, default_assignee
            FROM task_templates
            WHERE tenant_id = $1 AND service_id = $2
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(service_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("task_templates", e))?;

        rows.iter()
            .map(|row| TaskTemplateRow::from_row(row).map_err(decode_error)?.try_into())
            .collect()
    }

    async fn customer(
        &mut self,
        tenant_id: TenantId,
        id: CustomerId,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, account_code, account_kind
            FROM customers
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("customer", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.try_get("id").map_err(decode_error)?;
        Ok(Some(Customer {
            id: CustomerId::from_uuid(id),
            name: row.try_get("name").map_err(decode_error)?,
            account: decode_account(
                row.try_get("account_code").map_err(decode_error)?,
                row.try_get("account_kind").map_err(decode_error)?,
            )?,
        }))
    }

    async fn billing_settings(
        &mut self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantBillingSettings>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT default_income_code, default_income_kind, default_receivable_code,
                   default_receivable_kind, invoice_numbering
            FROM tenant_billing_settings
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("billing_settings", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let numbering: Option<serde_json::Value> =
            row.try_get("invoice_numbering").map_err(decode_error)?;
        let invoice_numbering = numbering
            .map(serde_json::from_value::<NumberingConfig>)
            .transpose()
            .map_err(|e| StoreError::Decode(format!("invoice_numbering: {e}")))?;

        Ok(Some(TenantBillingSettings {
            tenant_id,
            default_income_account: decode_account(
                row.try_get("default_income_code").map_err(decode_error)?,
                row.try_get("default_income_kind").map_err(decode_error)?,
            )?,
            default_receivable_account: decode_account(
                row.try_get("default_receivable_code").map_err(decode_error)?,
                row.try_get("default_receivable_kind").map_err(decode_error)?,
            )?,
            invoice_numbering,
        }))
    }

    async fn periods_for_work_order(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<Vec<Period>, StoreError> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM periods \
             WHERE tenant_id = $1 AND work_order_id = $2 ORDER BY start_date ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(work_order_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("periods_for_work_order", e))?;

        rows.iter()
            .map(|row| PeriodRow::from_row(row).map_err(decode_error)?.try_into())
            .collect()
    }

    async fn period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError> {
        let sql = format!("SELECT {PERIOD_COLUMNS} FROM periods WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("period", e))?;

        row.map(|row| PeriodRow::from_row(&row).map_err(decode_error)?.try_into())
            .transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, period_id = %id), err)]
    async fn lock_period(
        &mut self,
        tenant_id: TenantId,
        id: PeriodId,
    ) -> Result<Option<Period>, StoreError> {
        let sql = format!(
            "SELECT {PERIOD_COLUMNS} FROM periods WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_period", e))?;

        row.map(|row| PeriodRow::from_row(&row).map_err(decode_error)?.try_into())
            .transpose()
    }

    async fn insert_period(&mut self, period: &Period) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO periods (
                id, tenant_id, work_order_id, name, period_key, start_date, end_date,
                status, total_tasks, completed_tasks, billed, invoice_id,
                billing_amount_override_minor
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (work_order_id, start_date, end_date) DO NOTHING
            "#,
        )
        .bind(period.id.as_uuid())
        .bind(period.tenant_id.as_uuid())
        .bind(period.work_order_id.as_uuid())
        .bind(&period.name)
        .bind(&period.key)
        .bind(period.start)
        .bind(period.end)
        .bind(period.status.as_str())
        .bind(count_to_db(period.total_tasks)?)
        .bind(count_to_db(period.completed_tasks)?)
        .bind(period.billed)
        .bind(period.invoice_id.map(Uuid::from))
        .bind(period.billing_amount_override.map(Money::minor))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_period", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_period(&mut self, period: &Period) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE periods
            SET status = $3,
                total_tasks = $4,
                completed_tasks = $5,
                billed = $6,
                invoice_id = $7,
                billing_amount_override_minor = $8
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(period.tenant_id.as_uuid())
        .bind(period.id.as_uuid())
        .bind(period.status.as_str())
        .bind(count_to_db(period.total_tasks)?)
        .bind(count_to_db(period.completed_tasks)?)
        .bind(period.billed)
        .bind(period.invoice_id.map(Uuid::from))
        .bind(period.billing_amount_override.map(Money::minor))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_period", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("period {}", period.id)));
        }
        Ok(())
    }

    async fn insert_task_instance(&mut self, task: &TaskInstance) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_instances (
                id, tenant_id, period_id, template_id, title, due_date, status,
                assignee, completed_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (period_id, template_id, due_date) DO NOTHING
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.tenant_id.as_uuid())
        .bind(task.period_id.as_uuid())
        .bind(task.template_id.as_uuid())
        .bind(&task.title)
        .bind(task.due_date)
        .bind(task.status.as_str())
        .bind(task.assignee.map(Uuid::from))
        .bind(task.completed_on)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_task_instance", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn task_instance(
        &mut self,
        tenant_id: TenantId,
        id: TaskInstanceId,
    ) -> Result<Option<TaskInstance>, StoreError> {
        let sql =
            format!("SELECT {TASK_COLUMNS} FROM task_instances WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("task_instance", e))?;

        row.map(|row| TaskRow::from_row(&row).map_err(decode_error)?.try_into())
            .transpose()
    }

    async fn update_task_instance(&mut self, task: &TaskInstance) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE task_instances
            SET status = $3, assignee = $4, completed_on = $5
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(task.tenant_id.as_uuid())
        .bind(task.id.as_uuid())
        .bind(task.status.as_str())
        .bind(task.assignee.map(Uuid::from))
        .bind(task.completed_on)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_task_instance", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task instance {}", task.id)));
        }
        Ok(())
    }

    async fn tasks_for_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Vec<TaskInstance>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_instances \
             WHERE tenant_id = $1 AND period_id = $2 ORDER BY due_date ASC, title ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(period_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("tasks_for_period", e))?;

        rows.iter()
            .map(|row| TaskRow::from_row(row).map_err(decode_error)?.try_into())
            .collect()
    }

    async fn invoice(
        &mut self,
        tenant_id: TenantId,
        id: InvoiceId,
    ) -> Result<Option<Invoice>, StoreError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("invoice", e))?;
        self.hydrate_invoice(row).await
    }

    async fn invoice_for_period(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
        period_id: PeriodId,
    ) -> Result<Option<Invoice>, StoreError> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE tenant_id = $1 AND work_order_id = $2 AND period_id = $3"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(work_order_id.as_uuid())
            .bind(period_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("invoice_for_period", e))?;
        self.hydrate_invoice(row).await
    }

    #[instrument(skip(self, invoice), fields(tenant_id = %invoice.tenant_id, number = %invoice.number), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                id, tenant_id, customer_id, work_order_id, period_id, number,
                issue_date, due_date, subtotal_minor, tax_minor, total_minor, status,
                income_account_code, income_account_kind,
                receivable_account_code, receivable_account_kind
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (work_order_id, period_id) DO NOTHING
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.tenant_id.as_uuid())
        .bind(invoice.customer_id.as_uuid())
        .bind(invoice.work_order_id.map(Uuid::from))
        .bind(invoice.period_id.map(Uuid::from))
        .bind(&invoice.number)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.subtotal.minor())
        .bind(invoice.tax_amount.minor())
        .bind(invoice.total.minor())
        .bind(invoice.status.as_str())
        .bind(&invoice.income_account.code)
        .bind(invoice.income_account.kind.as_str())
        .bind(&invoice.receivable_account.code)
        .bind(invoice.receivable_account.kind.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for (idx, line) in invoice.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    invoice_id, line_no, description, quantity, unit_price_minor,
                    amount_minor, tax_rate_bp, tax_minor, service_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(invoice.id.as_uuid())
            .bind(count_to_db(u32::try_from(idx + 1).unwrap_or(u32::MAX))?)
            .bind(&line.description)
            .bind(count_to_db(line.quantity)?)
            .bind(line.unit_price.minor())
            .bind(line.amount.minor())
            .bind(count_to_db(line.tax_rate_bp)?)
            .bind(line.tax_amount.minor())
            .bind(line.service_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_invoice_line", e))?;
        }

        Ok(true)
    }

    async fn delete_invoice(
        &mut self,
        tenant_id: TenantId,
        id: InvoiceId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM invoices WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("invoice {id}")));
        }
        Ok(())
    }

    async fn next_document_sequence(
        &mut self,
        tenant_id: TenantId,
        kind: DocumentKind,
    ) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO document_counters (tenant_id, kind, next_index)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, kind)
            DO UPDATE SET next_index = document_counters.next_index + 1
            RETURNING next_index - 1 AS sequence_index
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("next_document_sequence", e))?;

        let index: i64 = row.try_get("sequence_index").map_err(decode_error)?;
        u64::try_from(index)
            .map_err(|_| StoreError::Decode(format!("negative document sequence {index}")))
    }

    async fn work_order_progress(
        &mut self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> Result<WorkOrderProgress, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS periods,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE billed) AS billed
            FROM periods
            WHERE tenant_id = $1 AND work_order_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(work_order_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("work_order_progress", e))?;

        let count = |column: &str| -> Result<u32, StoreError> {
            let value: i64 = row.try_get(column).map_err(decode_error)?;
            u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} = {value}")))
        };

        Ok(WorkOrderProgress {
            periods: count("periods")?,
            completed: count("completed")?,
            billed: count("billed")?,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23P01") => StoreError::UniqueViolation(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

fn count_to_db(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Storage(format!("count {value} exceeds INTEGER")))
}

fn count_from_db(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} = {value}")))
}

fn decode_account(
    code: Option<String>,
    kind: Option<String>,
) -> Result<Option<LedgerAccount>, StoreError> {
    match (code, kind) {
        (Some(code), Some(kind)) => {
            let kind = AccountKind::parse(&kind)
                .ok_or_else(|| StoreError::Decode(format!("unknown account kind: {kind}")))?;
            Ok(Some(LedgerAccount::new(code, kind)))
        }
        _ => Ok(None),
    }
}

fn required_account(code: String, kind: String) -> Result<LedgerAccount, StoreError> {
    decode_account(Some(code), Some(kind))?
        .ok_or_else(|| StoreError::Decode("missing account".to_string()))
}

/// Unknown stored patterns fall back to monthly.
fn decode_pattern(raw: &str, owner: Uuid) -> RecurrencePattern {
    RecurrencePattern::parse(raw).unwrap_or_else(|e| {
        warn!(owner = %owner, error = %e, "unknown recurrence pattern, falling back to monthly");
        RecurrencePattern::Monthly
    })
}

// SQLx row types

#[derive(Debug)]
struct WorkOrderRow {
    id: Uuid,
    tenant_id: Uuid,
    customer_id: Uuid,
    service_id: Uuid,
    recurrence_pattern: String,
    period_offset: String,
    anchor_start: NaiveDate,
    assignee: Option<Uuid>,
    billing_amount_minor: Option<i64>,
    auto_bill: bool,
    status: String,
}

impl<'r> FromRow<'r, PgRow> for WorkOrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(WorkOrderRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            customer_id: row.try_get("customer_id")?,
            service_id: row.try_get("service_id")?,
            recurrence_pattern: row.try_get("recurrence_pattern")?,
            period_offset: row.try_get("period_offset")?,
            anchor_start: row.try_get("anchor_start")?,
            assignee: row.try_get("assignee")?,
            billing_amount_minor: row.try_get("billing_amount_minor")?,
            auto_bill: row.try_get("auto_bill")?,
            status: row.try_get("status")?,
        })
    }
}

impl TryFrom<WorkOrderRow> for WorkOrder {
    type Error = StoreError;

    fn try_from(row: WorkOrderRow) -> Result<Self, Self::Error> {
        let pattern = decode_pattern(&row.recurrence_pattern, row.id);
        let offset = PeriodOffset::parse(&row.period_offset).unwrap_or_else(|e| {
            warn!(work_order_id = %row.id, error = %e, "unknown period offset, using current");
            PeriodOffset::Current
        });
        let status = WorkOrderStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Decode(format!("work order status: {}", row.status)))?;

        let mut work_order = WorkOrder::new(
            TenantId::from_uuid(row.tenant_id),
            CustomerId::from_uuid(row.customer_id),
            ServiceId::from_uuid(row.service_id),
            pattern,
            row.anchor_start,
        );
        work_order.id = WorkOrderId::from_uuid(row.id);
        work_order.offset = offset;
        work_order.assignee = row.assignee.map(UserId::from_uuid);
        work_order.billing_amount = row.billing_amount_minor.map(Money::from_minor);
        work_order.auto_bill = row.auto_bill;
        work_order.status = status;
        Ok(work_order)
    }
}

#[derive(Debug)]
struct ServiceRow {
    id: Uuid,
    name: String,
    default_price_minor: Option<i64>,
    tax_rate_bp: i32,
    income_account_code: Option<String>,
    income_account_kind: Option<String>,
    payment_terms_days: Option<i32>,
    is_active: bool,
}

impl<'r> FromRow<'r, PgRow> for ServiceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ServiceRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            default_price_minor: row.try_get("default_price_minor")?,
            tax_rate_bp: row.try_get("tax_rate_bp")?,
            income_account_code: row.try_get("income_account_code")?,
            income_account_kind: row.try_get("income_account_kind")?,
            payment_terms_days: row.try_get("payment_terms_days")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl TryFrom<ServiceRow> for ServiceTemplate {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(ServiceTemplate {
            id: ServiceId::from_uuid(row.id),
            name: row.name,
            default_price: row.default_price_minor.map(Money::from_minor),
            tax_rate_bp: count_from_db("tax_rate_bp", row.tax_rate_bp)?,
            income_account: decode_account(row.income_account_code, row.income_account_kind)?,
            payment_terms_days: row
                .payment_terms_days
                .map(|d| count_from_db("payment_terms_days", d))
                .transpose()?,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug)]
struct TaskTemplateRow {
    id: Uuid,
    service_id: Uuid,
    title: String,
    description: Option<String>,
    is_active: bool,
    frequency: String,
    due_policy: serde_json::Value,
    sort_order: i32,
    default_assignee: Option<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for TaskTemplateRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TaskTemplateRow {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            frequency: row.try_get("frequency")?,
            due_policy: row.try_get("due_policy")?,
            sort_order: row.try_get("sort_order")?,
            default_assignee: row.try_get("default_assignee")?,
        })
    }
}

impl TryFrom<TaskTemplateRow> for TaskTemplate {
    type Error = StoreError;

    fn try_from(row: TaskTemplateRow) -> Result<Self, Self::Error> {
        let due: DueDatePolicy = serde_json::from_value(row.due_policy)
            .map_err(|e| StoreError::Decode(format!("due_policy of template {}: {e}", row.id)))?;
        Ok(TaskTemplate {
            id: TaskTemplateId::from_uuid(row.id),
            service_id: ServiceId::from_uuid(row.service_id),
            title: row.title,
            description: row.description,
            is_active: row.is_active,
            frequency: decode_pattern(&row.frequency, row.id),
            due,
            sort_order: row.sort_order,
            default_assignee: row.default_assignee.map(UserId::from_uuid),
        })
    }
}

#[derive(Debug)]
struct PeriodRow {
    id: Uuid,
    tenant_id: Uuid,
    work_order_id: Uuid,
    name: String,
    period_key: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    total_tasks: i32,
    completed_tasks: i32,
    billed: bool,
    invoice_id: Option<Uuid>,
    billing_amount_override_minor: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for PeriodRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PeriodRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            work_order_id: row.try_get("work_order_id")?,
            name: row.try_get("name")?,
            period_key: row.try_get("period_key")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status: row.try_get("status")?,
            total_tasks: row.try_get("total_tasks")?,
            completed_tasks: row.try_get("completed_tasks")?,
            billed: row.try_get("billed")?,
            invoice_id: row.try_get("invoice_id")?,
            billing_amount_override_minor: row.try_get("billing_amount_override_minor")?,
        })
    }
}

impl TryFrom<PeriodRow> for Period {
    type Error = StoreError;

    fn try_from(row: PeriodRow) -> Result<Self, Self::Error> {
        Ok(Period {
            id: PeriodId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            work_order_id: WorkOrderId::from_uuid(row.work_order_id),
            name: row.name,
            key: row.period_key,
            start: row.start_date,
            end: row.end_date,
            status: PeriodStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Decode(format!("period status: {}", row.status)))?,
            total_tasks: count_from_db("total_tasks", row.total_tasks)?,
            completed_tasks: count_from_db("completed_tasks", row.completed_tasks)?,
            billed: row.billed,
            invoice_id: row.invoice_id.map(InvoiceId::from_uuid),
            billing_amount_override: row.billing_amount_override_minor.map(Money::from_minor),
        })
    }
}

#[derive(Debug)]
struct TaskRow {
    id: Uuid,
    tenant_id: Uuid,
    period_id: Uuid,
    template_id: Uuid,
    title: String,
    due_date: NaiveDate,
    status: String,
    assignee: Option<Uuid>,
    completed_on: Option<NaiveDate>,
}

impl<'r> FromRow<'r, PgRow> for TaskRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TaskRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            period_id: row.try_get("period_id")?,
            template_id: row.try_get("template_id")?,
            title: row.try_get("title")?,
            due_date: row.try_get("due_date")?,
            status: row.try_get("status")?,
            assignee: row.try_get("assignee")?,
            completed_on: row.try_get("completed_on")?,
        })
    }
}

impl TryFrom<TaskRow> for TaskInstance {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(TaskInstance {
            id: TaskInstanceId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            period_id: PeriodId::from_uuid(row.period_id),
            template_id: TaskTemplateId::from_uuid(row.template_id),
            title: row.title,
            due_date: row.due_date,
            status: TaskStatus::parse(&row.status)
                .ok_or_else(|| StoreError::Decode(format!("task status: {}", row.status)))?,
            assignee: row.assignee.map(UserId::from_uuid),
            completed_on: row.completed_on,
        })
    }
}

#[derive(Debug)]
struct InvoiceRow {
    id: Uuid,
    tenant_id: Uuid,
    customer_id: Uuid,
    work_order_id: Option<Uuid>,
    period_id: Option<Uuid>,
    number: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    subtotal_minor: i64,
    tax_minor: i64,
    total_minor: i64,
    status: String,
    income_account_code: String,
    income_account_kind: String,
    receivable_account_code: String,
    receivable_account_kind: String,
}

impl<'r> FromRow<'r, PgRow> for InvoiceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            customer_id: row.try_get("customer_id")?,
            work_order_id: row.try_get("work_order_id")?,
            period_id: row.try_get("period_id")?,
            number: row.try_get("number")?,
            issue_date: row.try_get("issue_date")?,
            due_date: row.try_get("due_date")?,
            subtotal_minor: row.try_get("subtotal_minor")?,
            tax_minor: row.try_get("tax_minor")?,
            total_minor: row.try_get("total_minor")?,
            status: row.try_get("status")?,
            income_account_code: row.try_get("income_account_code")?,
            income_account_kind: row.try_get("income_account_kind")?,
            receivable_account_code: row.try_get("receivable_account_code")?,
            receivable_account_kind: row.try_get("receivable_account_kind")?,
        })
    }
}

impl InvoiceRow {
    fn into_invoice(self, lines: Vec<InvoiceLine>) -> Result<Invoice, StoreError> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            customer_id: CustomerId::from_uuid(self.customer_id),
            work_order_id: self.work_order_id.map(WorkOrderId::from_uuid),
            period_id: self.period_id.map(PeriodId::from_uuid),
            number: self.number,
            issue_date: self.issue_date,
            due_date: self.due_date,
            subtotal: Money::from_minor(self.subtotal_minor),
            tax_amount: Money::from_minor(self.tax_minor),
            total: Money::from_minor(self.total_minor),
            status: InvoiceStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Decode(format!("invoice status: {}", self.status)))?,
            income_account: required_account(self.income_account_code, self.income_account_kind)?,
            receivable_account: required_account(
                self.receivable_account_code,
                self.receivable_account_kind,
            )?,
            lines,
        })
    }
}

#[derive(Debug)]
struct InvoiceLineRow {
    description: String,
    quantity: i32,
    unit_price_minor: i64,
    amount_minor: i64,
    tax_rate_bp: i32,
    tax_minor: i64,
    service_id: Uuid,
}

impl<'r> FromRow<'r, PgRow> for InvoiceLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceLineRow {
            description: row.try_get("description")?,
            quantity: row.try_get("quantity")?,
            unit_price_minor: row.try_get("unit_price_minor")?,
            amount_minor: row.try_get("amount_minor")?,
            tax_rate_bp: row.try_get("tax_rate_bp")?,
            tax_minor: row.try_get("tax_minor")?,
            service_id: row.try_get("service_id")?,
        })
    }
}

impl TryFrom<InvoiceLineRow> for InvoiceLine {
    type Error = StoreError;

    fn try_from(row: InvoiceLineRow) -> Result<Self, Self::Error> {
        Ok(InvoiceLine {
            description: row.description,
            quantity: count_from_db("quantity", row.quantity)?,
            unit_price: Money::from_minor(row.unit_price_minor),
            amount: Money::from_minor(row.amount_minor),
            tax_rate_bp: count_from_db("tax_rate_bp", row.tax_rate_bp)?,
            tax_amount: Money::from_minor(row.tax_minor),
            service_id: ServiceId::from_uuid(row.service_id),
        })
    }
}
