use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use cadence_core::{CustomerId, LedgerAccount, Money, TenantId, WorkOrderId};
use cadence_events::InMemoryEventBus;
use cadence_infra::{Engine, EngineConfig, InMemoryScheduleStore, ScheduleEnvelope, ScheduleStore};
use cadence_invoicing::{Customer, NumberingConfig, TenantBillingSettings};
use cadence_scheduling::{
    DueDatePolicy, DueDateRule, PeriodOffset, RecurrencePattern, ServiceTemplate, TaskStatus,
    TaskTemplate, WorkOrder, calculate, plan_period,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::runtime::Runtime;

type BenchEngine = Engine<InMemoryScheduleStore, Arc<InMemoryEventBus<ScheduleEnvelope>>>;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().build().unwrap()
}

/// `count` templates cycling through every frequency that fits `pattern`.
fn templates(service: &ServiceTemplate, pattern: RecurrencePattern, count: usize) -> Vec<TaskTemplate> {
    let frequencies: Vec<_> = RecurrencePattern::ALL
        .into_iter()
        .filter(|f| !pattern.is_finer_than(*f))
        .collect();
    (0..count)
        .map(|i| {
            TaskTemplate::new(
                service.id,
                format!("Task {i}"),
                frequencies[i % frequencies.len()],
                DueDatePolicy::with_rule(DueDateRule::days_after_end(5 + i as i32)),
            )
            .unwrap()
        })
        .collect()
}

/// Engine with one monthly work order anchored at 2020-01-01.
fn setup_engine(rt: &Runtime, template_count: usize) -> (BenchEngine, TenantId, WorkOrderId) {
    rt.block_on(async {
        let store = InMemoryScheduleStore::new();
        let tenant_id = TenantId::new();
        let service = ServiceTemplate::new("Bookkeeping")
            .unwrap()
            .with_default_price(Money::from_minor(500_000))
            .with_tax_rate_bp(1800)
            .with_income_account(LedgerAccount::revenue("4000"));
        let customer = Customer {
            id: CustomerId::new(),
            name: "Acme Traders".to_string(),
            account: Some(LedgerAccount::asset("1200")),
        };

        for template in templates(&service, RecurrencePattern::Monthly, template_count) {
            store.put_task_template(tenant_id, template).await;
        }
        let work_order = WorkOrder::new(
            tenant_id,
            customer.id,
            service.id,
            RecurrencePattern::Monthly,
            d(2020, 1, 1),
        );
        let work_order_id = work_order.id;
        store.put_service(tenant_id, service).await;
        store.put_customer(tenant_id, customer).await;
        store.put_work_order(work_order).await;
        store
            .put_billing_settings(TenantBillingSettings {
                tenant_id,
                default_income_account: None,
                default_receivable_account: None,
                invoice_numbering: Some(NumberingConfig::default()),
            })
            .await;

        let engine = Engine::new(store, Arc::new(InMemoryEventBus::new()), EngineConfig::default());
        (engine, tenant_id, work_order_id)
    })
}

fn bench_plan_period(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_period");
    let service = ServiceTemplate::new("Compliance").unwrap();
    let work_order = WorkOrder::new(
        TenantId::new(),
        CustomerId::new(),
        service.id,
        RecurrencePattern::Yearly,
        d(2024, 4, 1),
    );
    let window = calculate(RecurrencePattern::Yearly, d(2024, 4, 1), PeriodOffset::Current);

    for count in [1usize, 8, 32] {
        let list = templates(&service, RecurrencePattern::Yearly, count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &list, |b, list| {
            b.iter(|| black_box(plan_period(&work_order, list, window)));
        });
    }

    group.finish();
}

fn bench_backfill(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize_backfill");
    let rt = runtime();

    for years in [1i32, 5] {
        let today = d(2020 + years, 1, 10);
        group.throughput(Throughput::Elements((years * 12) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(years), &today, |b, today| {
            b.iter_batched(
                || setup_engine(&rt, 4),
                |(engine, tenant_id, work_order_id)| {
                    let report =
                        rt.block_on(engine.materialize_periods(tenant_id, work_order_id, *today));
                    black_box(report)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_complete_and_bill(c: &mut Criterion) {
    let mut group = c.benchmark_group("complete_and_bill");
    let rt = runtime();
    let today = d(2020, 2, 10);

    group.bench_function("single_task_period", |b| {
        b.iter_batched(
            || {
                let (engine, tenant_id, work_order_id) = setup_engine(&rt, 1);
                let task_id = rt.block_on(async {
                    let report = engine
                        .materialize_periods(tenant_id, work_order_id, today)
                        .await;
                    let mut tx = engine.store().begin().await.unwrap();
                    tx.tasks_for_period(tenant_id, report.created[0].period_id)
                        .await
                        .unwrap()[0]
                        .id
                });
                (engine, tenant_id, task_id)
            },
            |(engine, tenant_id, task_id)| {
                let report = rt.block_on(engine.record_task_status(
                    tenant_id,
                    task_id,
                    TaskStatus::Completed,
                    today,
                ));
                black_box(report)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_plan_period,
    bench_backfill,
    bench_complete_and_bill
);
criterion_main!(benches);
