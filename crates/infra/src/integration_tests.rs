//! Engine scenarios against the in-memory store.
//!
//! Covers: WorkOrder -> materialize -> task completion -> draft invoice -> reversal
//!
//! Verifies:
//! - Materialization is idempotent and periods never overlap
//! - A limited backfill resumes where the previous run stopped
//! - Concurrent calls for one work order serialize
//! - A period is billed at most once, across reopen/complete cycles
//! - Configuration gaps skip billing without failing the status write
//! - Events are published only for committed steps

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use cadence_core::{CustomerId, LedgerAccount, Money, PeriodId, TaskInstanceId, TenantId};
    use cadence_events::{EventBus, InMemoryEventBus, ScheduleEvent, SkipReason};
    use cadence_invoicing::{Customer, InvoiceStatus, NumberingConfig, TenantBillingSettings};
    use cadence_scheduling::{
        DueDatePolicy, DueDateRule, Period, PeriodStatus, PeriodTransition, RecurrencePattern,
        ServiceTemplate, TaskInstance, TaskStatus, TaskTemplate, WorkOrder, WorkOrderStatus,
    };

    use crate::config::EngineConfig;
    use crate::engine::{
        BillingOutcome, Engine, EngineError, Halt, ReversalOutcome, ScheduleEnvelope,
        TaskStatusReport,
    };
    use crate::store::{InMemoryScheduleStore, ScheduleStore};
    use crate::sweep::DailySweep;

    type TestBus = Arc<InMemoryEventBus<ScheduleEnvelope>>;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        engine: Engine<InMemoryScheduleStore, TestBus>,
        store: InMemoryScheduleStore,
        bus: TestBus,
        tenant_id: TenantId,
        service: ServiceTemplate,
        customer: Customer,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_service(
                ServiceTemplate::new("Bookkeeping")
                    .unwrap()
                    .with_default_price(Money::from_minor(500_000))
                    .with_tax_rate_bp(1800)
                    .with_income_account(LedgerAccount::revenue("4000")),
            )
            .await
        }

        async fn with_service(service: ServiceTemplate) -> Self {
            let store = InMemoryScheduleStore::new();
            let bus: TestBus = Arc::new(InMemoryEventBus::new());
            let tenant_id = TenantId::new();
            let customer = Customer {
                id: CustomerId::new(),
                name: "Acme Traders".to_string(),
                account: None,
            };

            store.put_service(tenant_id, service.clone()).await;
            store.put_customer(tenant_id, customer.clone()).await;
            store
                .put_billing_settings(TenantBillingSettings {
                    tenant_id,
                    default_income_account: None,
                    default_receivable_account: Some(LedgerAccount::asset("1200")),
                    invoice_numbering: Some(NumberingConfig::default()),
                })
                .await;

            let engine = Engine::new(store.clone(), bus.clone(), EngineConfig::default());
            Self {
                engine,
                store,
                bus,
                tenant_id,
                service,
                customer,
            }
        }

        async fn add_template(&self, title: &str, frequency: RecurrencePattern, days: i32) {
            let template = TaskTemplate::new(
                self.service.id,
                title,
                frequency,
                DueDatePolicy::with_rule(DueDateRule::days_after_end(days)),
            )
            .unwrap();
            self.store.put_task_template(self.tenant_id, template).await;
        }

        /// A second engine over the same store and bus.
        fn engine_with(&self, config: EngineConfig) -> Engine<InMemoryScheduleStore, TestBus> {
            Engine::new(self.store.clone(), self.bus.clone(), config)
        }

        fn work_order(&self, pattern: RecurrencePattern, anchor: NaiveDate) -> WorkOrder {
            WorkOrder::new(self.tenant_id, self.customer.id, self.service.id, pattern, anchor)
        }

        /// Monthly bookkeeping from January 2025, due five days after month end.
        async fn monthly(&self) -> WorkOrder {
            self.add_template("Bookkeeping", RecurrencePattern::Monthly, 5).await;
            let work_order = self.work_order(RecurrencePattern::Monthly, d(2025, 1, 1));
            self.store.put_work_order(work_order.clone()).await;
            work_order
        }

        async fn periods(&self, work_order: &WorkOrder) -> Vec<Period> {
            let mut tx = self.store.begin().await.unwrap();
            tx.periods_for_work_order(self.tenant_id, work_order.id)
                .await
                .unwrap()
        }

        async fn period(&self, period_id: PeriodId) -> Period {
            let mut tx = self.store.begin().await.unwrap();
            tx.period(self.tenant_id, period_id).await.unwrap().unwrap()
        }

        async fn tasks(&self, period_id: PeriodId) -> Vec<TaskInstance> {
            let mut tx = self.store.begin().await.unwrap();
            tx.tasks_for_period(self.tenant_id, period_id).await.unwrap()
        }

        async fn set(
            &self,
            task_id: TaskInstanceId,
            status: TaskStatus,
            today: NaiveDate,
        ) -> TaskStatusReport {
            self.engine
                .record_task_status(self.tenant_id, task_id, status, today)
                .await
                .unwrap()
        }

        /// Complete every task of the period; returns the last report.
        async fn complete_all(
            &self,
            period_id: PeriodId,
            today: NaiveDate,
        ) -> TaskStatusReport {
            let mut last = None;
            for task in self.tasks(period_id).await {
                last = Some(self.set(task.id, TaskStatus::Completed, today).await);
            }
            last.unwrap()
        }

        /// Materialize January 2025 only and return its period id.
        async fn january(&self, work_order: &WorkOrder) -> PeriodId {
            let report = self
                .engine
                .materialize_periods(self.tenant_id, work_order.id, d(2025, 2, 6))
                .await;
            assert_eq!(report.created.len(), 1);
            report.created[0].period_id
        }
    }

    #[tokio::test]
    async fn backfills_every_overdue_period() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 7, 10))
            .await;

        let keys: Vec<_> = report.created.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            ["2025-01", "2025-02", "2025-03", "2025-04", "2025-05", "2025-06"]
        );
        assert_eq!(
            report.halted,
            Halt::NotYetDue {
                key: "2025-07".to_string(),
                latest_due: d(2025, 8, 5),
            }
        );

        let periods = fx.periods(&work_order).await;
        assert_eq!(periods.len(), 6);
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
        assert!(periods.iter().all(|p| p.total_tasks == 1));
        assert_eq!(periods[0].name, "January 2025");
    }

    #[tokio::test]
    async fn rerun_on_the_same_day_creates_nothing() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let today = d(2025, 7, 10);

        let first = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, today)
            .await;
        let second = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, today)
            .await;

        assert_eq!(first.created.len(), 6);
        assert!(second.created.is_empty());
        assert_eq!(second.skipped_existing, 6);
        assert_eq!(fx.periods(&work_order).await.len(), 6);
    }

    #[tokio::test]
    async fn limited_backfill_resumes_on_each_run() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let engine = fx.engine_with(EngineConfig {
            max_periods_per_run: 3,
            ..EngineConfig::default()
        });
        let today = d(2025, 12, 10);

        let mut created = Vec::new();
        let mut halts = Vec::new();
        for _ in 0..5 {
            let report = engine
                .materialize_periods(fx.tenant_id, work_order.id, today)
                .await;
            created.push(report.created.len());
            halts.push(report.halted);
        }

        assert_eq!(created, [3, 3, 3, 2, 0]);
        assert_eq!(&halts[..3], [Halt::Limit, Halt::Limit, Halt::Limit]);
        assert!(matches!(halts[4], Halt::NotYetDue { ref key, .. } if key == "2025-12"));

        let periods = fx.periods(&work_order).await;
        assert_eq!(periods.len(), 11);
        assert_eq!(periods.last().unwrap().key, "2025-11");
    }

    #[tokio::test]
    async fn concurrent_runs_create_each_period_once() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let today = d(2025, 7, 10);

        let (a, b) = tokio::join!(
            fx.engine.materialize_periods(fx.tenant_id, work_order.id, today),
            fx.engine.materialize_periods(fx.tenant_id, work_order.id, today),
        );

        assert!(!a.is_failure() && !b.is_failure());
        assert_eq!(a.created.len() + b.created.len(), 6);
        assert!(a.created.is_empty() || b.created.is_empty());
        assert_eq!(fx.periods(&work_order).await.len(), 6);
    }

    #[tokio::test]
    async fn racing_completions_draft_a_single_invoice() {
        let fx = Fixture::new().await;
        fx.add_template("GST filing", RecurrencePattern::Monthly, 5).await;
        let work_order = fx.work_order(RecurrencePattern::Quarterly, d(2025, 1, 1));
        fx.store.put_work_order(work_order.clone()).await;
        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 4, 6))
            .await;
        let period_id = report.created[0].period_id;
        let tasks = fx.tasks(period_id).await;
        let today = d(2025, 4, 10);

        fx.set(tasks[0].id, TaskStatus::Completed, today).await;
        let (second, third) = tokio::join!(
            fx.set(tasks[1].id, TaskStatus::Completed, today),
            fx.set(tasks[2].id, TaskStatus::Completed, today),
        );

        let drafted = [&second, &third]
            .iter()
            .filter(|r| matches!(r.billing, Some(BillingOutcome::Drafted { .. })))
            .count();
        assert_eq!(drafted, 1);
        assert_eq!(fx.store.invoices(fx.tenant_id).await.len(), 1);
        let period = fx.period(period_id).await;
        assert_eq!(period.status, PeriodStatus::Completed);
        assert!(period.billed);
    }

    #[tokio::test]
    async fn templates_coarser_than_the_work_order_are_not_scheduled() {
        let fx = Fixture::new().await;
        fx.add_template("Annual return", RecurrencePattern::Yearly, 30).await;
        let work_order = fx.monthly().await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 4, 10))
            .await;

        let keys: Vec<_> = report.created.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["2025-01", "2025-02", "2025-03"]);
        assert!(report.created.iter().all(|p| p.task_count == 1));
        for period in &report.created {
            assert!(fx.tasks(period.period_id).await.iter().all(|t| t.title == "Bookkeeping"));
        }
    }

    #[tokio::test]
    async fn period_waits_until_its_latest_due_date_has_passed() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;

        let on_due_date = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 2, 5))
            .await;
        assert!(on_due_date.created.is_empty());
        assert!(matches!(on_due_date.halted, Halt::NotYetDue { ref key, .. } if key == "2025-01"));

        let day_after = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 2, 6))
            .await;
        assert_eq!(day_after.created.len(), 1);
    }

    #[tokio::test]
    async fn quarterly_period_holds_one_task_per_monthly_cycle() {
        let fx = Fixture::new().await;
        fx.add_template("GST filing", RecurrencePattern::Monthly, 5).await;
        let work_order = fx.work_order(RecurrencePattern::Quarterly, d(2025, 1, 1));
        fx.store.put_work_order(work_order.clone()).await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 4, 6))
            .await;
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].key, "2025-Q1");

        let tasks = fx.tasks(report.created[0].period_id).await;
        let due: Vec<_> = tasks.iter().map(|t| t.due_date).collect();
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(due, [d(2025, 2, 5), d(2025, 3, 5), d(2025, 4, 5)]);
        assert_eq!(titles, ["GST filing - Jan", "GST filing - Feb", "GST filing - Mar"]);
    }

    #[tokio::test]
    async fn occurrences_due_before_the_anchor_are_dropped() {
        let fx = Fixture::new().await;
        fx.add_template("GST filing", RecurrencePattern::Monthly, 5).await;
        let work_order = fx.work_order(RecurrencePattern::Quarterly, d(2025, 2, 15));
        fx.store.put_work_order(work_order.clone()).await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 4, 6))
            .await;
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].task_count, 2);
    }

    #[tokio::test]
    async fn work_order_without_templates_creates_no_periods() {
        let fx = Fixture::new().await;
        let work_order = fx.work_order(RecurrencePattern::Monthly, d(2025, 1, 1));
        fx.store.put_work_order(work_order.clone()).await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 3, 15))
            .await;
        assert!(report.created.is_empty());
        assert_eq!(report.skipped_empty, 3);
        assert_eq!(report.halted, Halt::ReachedToday);
    }

    #[tokio::test]
    async fn inactive_and_missing_work_orders_do_not_materialize() {
        let fx = Fixture::new().await;
        let mut work_order = fx.monthly().await;
        work_order.status = WorkOrderStatus::OnHold;
        fx.store.put_work_order(work_order.clone()).await;

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 7, 10))
            .await;
        assert_eq!(report.halted, Halt::WorkOrderInactive);

        let missing = fx
            .engine
            .materialize_periods(fx.tenant_id, cadence_core::WorkOrderId::new(), d(2025, 7, 10))
            .await;
        assert!(matches!(
            missing.halted,
            Halt::Failed(EngineError::NotFound { entity: "work order", .. })
        ));
    }

    #[tokio::test]
    async fn completing_every_task_drafts_one_invoice() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;
        let today = d(2025, 2, 10);

        let report = fx.complete_all(period_id, today).await;

        assert_eq!(report.transition, PeriodTransition::Completed);
        assert_eq!(report.period_status, PeriodStatus::Completed);
        let Some(BillingOutcome::Drafted { number, total, invoice_id }) = report.billing else {
            panic!("expected a draft invoice, got {:?}", report.billing);
        };
        assert_eq!(number, "INV-0001");
        assert_eq!(total, Money::from_minor(590_000));

        let invoices = fx.store.invoices(fx.tenant_id).await;
        assert_eq!(invoices.len(), 1);
        let invoice = &invoices[0];
        assert_eq!(invoice.id, invoice_id);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.issue_date, today);
        assert_eq!(invoice.due_date, d(2025, 2, 25));
        assert_eq!(invoice.tax_amount, Money::from_minor(90_000));
        assert_eq!(invoice.lines[0].description, "Bookkeeping - January 2025");
        assert_eq!(invoice.income_account, LedgerAccount::revenue("4000"));
        assert_eq!(invoice.receivable_account, LedgerAccount::asset("1200"));

        let period = fx.period(period_id).await;
        assert!(period.billed);
        assert_eq!(period.invoice_id, Some(invoice_id));
    }

    #[tokio::test]
    async fn repeating_a_status_is_a_no_op() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;
        let task = fx.tasks(period_id).await.remove(0);

        fx.set(task.id, TaskStatus::Completed, d(2025, 2, 10)).await;
        let again = fx.set(task.id, TaskStatus::Completed, d(2025, 2, 11)).await;

        assert!(!again.changed);
        assert_eq!(again.transition, PeriodTransition::Unchanged);
        assert!(again.billing.is_none());
        assert_eq!(fx.store.invoices(fx.tenant_id).await.len(), 1);
        assert_eq!(fx.tasks(period_id).await[0].completed_on, Some(d(2025, 2, 10)));
    }

    #[tokio::test]
    async fn reopening_deletes_the_draft_and_recompletion_drafts_anew() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;
        let task = fx.tasks(period_id).await.remove(0);

        let first = fx.set(task.id, TaskStatus::Completed, d(2025, 2, 10)).await;
        let first_invoice = first.billing.as_ref().and_then(BillingOutcome::invoice_id).unwrap();

        let reopened = fx.set(task.id, TaskStatus::Pending, d(2025, 2, 11)).await;
        assert_eq!(reopened.transition, PeriodTransition::Reopened);
        assert_eq!(
            reopened.reversal,
            Some(ReversalOutcome::Deleted {
                invoice_id: first_invoice
            })
        );
        assert!(fx.store.invoices(fx.tenant_id).await.is_empty());
        let period = fx.period(period_id).await;
        assert!(!period.billed);
        assert_eq!(period.invoice_id, None);

        let again = fx.set(task.id, TaskStatus::Completed, d(2025, 2, 12)).await;
        let Some(BillingOutcome::Drafted { number, .. }) = again.billing else {
            panic!("expected a new draft, got {:?}", again.billing);
        };
        assert_eq!(number, "INV-0002");
        assert_eq!(fx.store.invoices(fx.tenant_id).await.len(), 1);
    }

    #[tokio::test]
    async fn sent_invoice_survives_reopening() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;
        let task = fx.tasks(period_id).await.remove(0);

        fx.set(task.id, TaskStatus::Completed, d(2025, 2, 10)).await;
        let mut invoice = fx.store.invoices(fx.tenant_id).await.remove(0);
        invoice.mark_sent().unwrap();
        fx.store.put_invoice(invoice.clone()).await.unwrap();

        let reopened = fx.set(task.id, TaskStatus::Pending, d(2025, 2, 11)).await;
        assert_eq!(
            reopened.reversal,
            Some(ReversalOutcome::Retained {
                invoice_id: invoice.id,
                status: InvoiceStatus::Sent,
            })
        );
        assert!(fx.period(period_id).await.billed);

        let again = fx.set(task.id, TaskStatus::Completed, d(2025, 2, 12)).await;
        assert_eq!(again.billing, Some(BillingOutcome::Skipped(SkipReason::AlreadyBilled)));
        assert_eq!(fx.store.invoices(fx.tenant_id).await.len(), 1);
    }

    #[tokio::test]
    async fn zero_tax_rate_still_carries_a_tax_line() {
        let fx = Fixture::with_service(
            ServiceTemplate::new("Payroll")
                .unwrap()
                .with_default_price(Money::from_minor(120_000))
                .with_income_account(LedgerAccount::revenue("4000")),
        )
        .await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;

        fx.complete_all(period_id, d(2025, 2, 10)).await;

        let invoice = fx.store.invoices(fx.tenant_id).await.remove(0);
        assert_eq!(invoice.tax_amount, Money::ZERO);
        assert_eq!(invoice.total, invoice.subtotal);
        assert_eq!(invoice.lines[0].tax_rate_bp, 0);
    }

    #[tokio::test]
    async fn work_order_amount_overrides_service_price() {
        let fx = Fixture::new().await;
        fx.add_template("Bookkeeping", RecurrencePattern::Monthly, 5).await;
        let mut work_order = fx.work_order(RecurrencePattern::Monthly, d(2025, 1, 1));
        work_order.billing_amount = Some(Money::from_minor(750_000));
        fx.store.put_work_order(work_order.clone()).await;
        let period_id = fx.january(&work_order).await;

        fx.complete_all(period_id, d(2025, 2, 10)).await;

        let invoice = fx.store.invoices(fx.tenant_id).await.remove(0);
        assert_eq!(invoice.subtotal, Money::from_minor(750_000));
    }

    #[tokio::test]
    async fn auto_bill_off_skips_billing_and_reports_why() {
        let fx = Fixture::new().await;
        fx.add_template("Bookkeeping", RecurrencePattern::Monthly, 5).await;
        let mut work_order = fx.work_order(RecurrencePattern::Monthly, d(2025, 1, 1));
        work_order.auto_bill = false;
        fx.store.put_work_order(work_order.clone()).await;
        let period_id = fx.january(&work_order).await;
        let sub = fx.bus.subscribe();

        let report = fx.complete_all(period_id, d(2025, 2, 10)).await;

        assert_eq!(report.period_status, PeriodStatus::Completed);
        assert_eq!(
            report.billing,
            Some(BillingOutcome::Skipped(SkipReason::AutoBillDisabled))
        );
        assert!(fx.store.invoices(fx.tenant_id).await.is_empty());
        assert!(sub.drain().iter().any(|env| matches!(
            env.payload(),
            ScheduleEvent::BillingSkipped {
                reason: SkipReason::AutoBillDisabled,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn missing_numbering_config_can_be_fixed_and_retried() {
        let fx = Fixture::new().await;
        fx.store
            .put_billing_settings(TenantBillingSettings {
                tenant_id: fx.tenant_id,
                default_income_account: None,
                default_receivable_account: Some(LedgerAccount::asset("1200")),
                invoice_numbering: None,
            })
            .await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;

        let report = fx.complete_all(period_id, d(2025, 2, 10)).await;
        assert_eq!(
            report.billing,
            Some(BillingOutcome::Skipped(SkipReason::NoNumberingConfig))
        );
        assert!(!fx.period(period_id).await.billed);

        fx.store
            .put_billing_settings(TenantBillingSettings {
                tenant_id: fx.tenant_id,
                default_income_account: None,
                default_receivable_account: Some(LedgerAccount::asset("1200")),
                invoice_numbering: Some(NumberingConfig::default()),
            })
            .await;
        let retry = fx
            .engine
            .bill_period(fx.tenant_id, period_id, d(2025, 2, 11))
            .await;
        assert!(matches!(retry, BillingOutcome::Drafted { .. }));

        let repeat = fx
            .engine
            .bill_period(fx.tenant_id, period_id, d(2025, 2, 12))
            .await;
        assert_eq!(repeat, BillingOutcome::Skipped(SkipReason::AlreadyBilled));
        assert_eq!(fx.store.invoices(fx.tenant_id).await.len(), 1);
    }

    #[tokio::test]
    async fn income_account_must_exist_and_be_revenue() {
        let fx = Fixture::with_service(
            ServiceTemplate::new("Audit")
                .unwrap()
                .with_default_price(Money::from_minor(100_000)),
        )
        .await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;

        let report = fx.complete_all(period_id, d(2025, 2, 10)).await;
        assert_eq!(
            report.billing,
            Some(BillingOutcome::Skipped(SkipReason::NoIncomeAccount))
        );

        let mut service = fx.service.clone();
        service.income_account = Some(LedgerAccount::asset("1000"));
        fx.store.put_service(fx.tenant_id, service).await;
        let retry = fx
            .engine
            .bill_period(fx.tenant_id, period_id, d(2025, 2, 11))
            .await;
        assert_eq!(
            retry,
            BillingOutcome::Skipped(SkipReason::IncomeAccountNotRevenue)
        );
    }

    #[tokio::test]
    async fn billing_an_open_period_is_skipped() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;

        let outcome = fx
            .engine
            .bill_period(fx.tenant_id, period_id, d(2025, 2, 10))
            .await;
        assert_eq!(outcome, BillingOutcome::Skipped(SkipReason::PeriodNotCompleted));
    }

    #[tokio::test]
    async fn unknown_or_foreign_task_is_not_found() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let period_id = fx.january(&work_order).await;
        let task = fx.tasks(period_id).await.remove(0);

        let unknown = fx
            .engine
            .record_task_status(
                fx.tenant_id,
                TaskInstanceId::new(),
                TaskStatus::Completed,
                d(2025, 2, 10),
            )
            .await;
        assert!(matches!(unknown, Err(EngineError::NotFound { .. })));

        let foreign = fx
            .engine
            .record_task_status(TenantId::new(), task.id, TaskStatus::Completed, d(2025, 2, 10))
            .await;
        assert!(matches!(foreign, Err(EngineError::NotFound { .. })));
        assert_eq!(fx.tasks(period_id).await[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn progress_counts_completed_and_billed_periods() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 7, 10))
            .await;

        fx.complete_all(report.created[0].period_id, d(2025, 7, 10)).await;

        let progress = fx
            .engine
            .work_order_progress(fx.tenant_id, work_order.id)
            .await
            .unwrap();
        assert_eq!(progress.periods, 6);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.billed, 1);
    }

    #[tokio::test]
    async fn events_follow_committed_steps() {
        let fx = Fixture::new().await;
        let work_order = fx.monthly().await;
        let sub = fx.bus.subscribe();

        let report = fx
            .engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 3, 10))
            .await;
        fx.complete_all(report.created[0].period_id, d(2025, 3, 10)).await;

        let events: Vec<_> = sub.drain();
        assert!(events.iter().all(|env| env.tenant_id() == fx.tenant_id));
        let types: Vec<_> = events
            .iter()
            .map(|env| match env.payload() {
                ScheduleEvent::PeriodMaterialized { .. } => "materialized",
                ScheduleEvent::PeriodCompleted { .. } => "completed",
                ScheduleEvent::PeriodReopened { .. } => "reopened",
                ScheduleEvent::InvoiceDrafted { .. } => "drafted",
                ScheduleEvent::InvoiceReversed { .. } => "reversed",
                ScheduleEvent::BillingSkipped { .. } => "skipped",
            })
            .collect();
        assert_eq!(types, ["materialized", "materialized", "completed", "drafted"]);

        // Nothing new to commit, nothing published.
        fx.engine
            .materialize_periods(fx.tenant_id, work_order.id, d(2025, 3, 10))
            .await;
        assert!(sub.drain().is_empty());
    }

    #[tokio::test]
    async fn daily_sweep_visits_active_work_orders_only() {
        let fx = Fixture::new().await;
        let active = fx.monthly().await;
        let mut paused = fx.work_order(RecurrencePattern::Monthly, d(2025, 1, 1));
        paused.status = WorkOrderStatus::OnHold;
        fx.store.put_work_order(paused.clone()).await;

        let summary = DailySweep::new(&fx.engine).run(d(2025, 7, 10)).await;

        assert_eq!(summary.examined, 1);
        assert_eq!(summary.periods_created, 6);
        assert!(summary.failures.is_empty());
        assert_eq!(fx.periods(&active).await.len(), 6);
        assert!(fx.periods(&paused).await.is_empty());

        let rerun = DailySweep::new(&fx.engine).run(d(2025, 7, 10)).await;
        assert_eq!(rerun.periods_created, 0);
    }
}
