//! Materialization planning.
//!
//! Pure half of the period materializer: which windows a work order walks,
//! which task occurrences each window holds, and whether the window may be
//! created as of a given day. Persistence and locking live in the infra crate.

use std::collections::HashSet;

use chrono::NaiveDate;

use cadence_core::{TaskInstanceId, TaskTemplateId, TenantId, UserId, WorkOrderId};

use crate::calendar::PeriodWindow;
use crate::period::{Period, TaskInstance, TaskStatus};
use crate::template::{TaskTemplate, expand};
use crate::work_order::WorkOrder;

/// Successive windows of a work order, starting at its first window.
#[derive(Debug, Clone)]
pub struct PeriodWalk {
    next: Option<PeriodWindow>,
}

impl PeriodWalk {
    pub fn new(first: PeriodWindow) -> Self {
        Self { next: Some(first) }
    }

    pub fn for_work_order(work_order: &WorkOrder) -> Self {
        Self::new(work_order.first_window())
    }
}

impl Iterator for PeriodWalk {
    type Item = PeriodWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next();
        Some(current)
    }
}

/// A task instance that would be created with its period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub template_id: TaskTemplateId,
    pub title: String,
    pub due_date: NaiveDate,
    pub sort_order: i32,
    pub assignee: Option<UserId>,
}

/// Whether a planned period may be materialized on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Every occurrence is overdue (`today > latest_due`).
    Eligible { latest_due: NaiveDate },
    /// The latest occurrence is due today or later.
    NotYetDue { latest_due: NaiveDate },
    /// No task occurrence falls in this window; it is never created.
    Empty,
    /// The window starts after today.
    Future,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodPlan {
    pub window: PeriodWindow,
    pub tasks: Vec<PlannedTask>,
}

impl PeriodPlan {
    pub fn latest_due(&self) -> Option<NaiveDate> {
        self.tasks.iter().map(|t| t.due_date).max()
    }

    pub fn eligibility(&self, today: NaiveDate) -> Eligibility {
        if self.window.start() > today {
            return Eligibility::Future;
        }
        match self.latest_due() {
            None => Eligibility::Empty,
            Some(latest_due) if today > latest_due => Eligibility::Eligible { latest_due },
            Some(latest_due) => Eligibility::NotYetDue { latest_due },
        }
    }

    /// Build the period row and its task instances.
    pub fn into_records(
        self,
        tenant_id: TenantId,
        work_order_id: WorkOrderId,
    ) -> (Period, Vec<TaskInstance>) {
        let total = u32::try_from(self.tasks.len()).unwrap_or(u32::MAX);
        let period = Period::from_window(tenant_id, work_order_id, &self.window, total);
        let tasks = self
            .tasks
            .into_iter()
            .map(|t| TaskInstance {
                id: TaskInstanceId::new(),
                tenant_id,
                period_id: period.id,
                template_id: t.template_id,
                title: t.title,
                due_date: t.due_date,
                status: TaskStatus::Pending,
                assignee: t.assignee,
                completed_on: None,
            })
            .collect();
        (period, tasks)
    }
}

/// Expand every active template of the work order's service against `window`.
///
/// Templates coarser than the work order's pattern are left out.
/// Tasks are ordered by due date, then template sort order, then title.
/// A `(template, due date)` pair appears at most once.
pub fn plan_period(
    work_order: &WorkOrder,
    templates: &[TaskTemplate],
    window: PeriodWindow,
) -> PeriodPlan {
    let mut seen = HashSet::new();
    let mut tasks: Vec<PlannedTask> = templates
        .iter()
        .filter(|t| t.service_id == work_order.service_id && t.fits(work_order.pattern()))
        .flat_map(|template| {
            expand(template, &window, work_order.anchor_start)
                .into_iter()
                .map(move |occurrence| PlannedTask {
                    template_id: template.id,
                    title: template.instance_title(occurrence.sub_label.as_deref()),
                    due_date: occurrence.due_date,
                    sort_order: template.sort_order,
                    assignee: template.default_assignee.or(work_order.assignee),
                })
        })
        .filter(|task| seen.insert((task.template_id, task.due_date)))
        .collect();

    tasks.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then(a.sort_order.cmp(&b.sort_order))
            .then_with(|| a.title.cmp(&b.title))
    });

    PeriodPlan { window, tasks }
}
