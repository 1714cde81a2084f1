//! Recurring obligation scheduling (pure domain logic).
//!
//! Period boundaries, due-date rules, task template expansion and the
//! materialization plan for a work order. No IO and no implicit clock: every
//! function that needs "today" takes it as an argument.

pub mod calendar;
pub mod due_date;
pub mod period;
pub mod plan;
pub mod recurrence;
pub mod service;
pub mod template;
pub mod work_order;

pub use calendar::{PeriodWindow, calculate, calculate_named};
pub use due_date::{DueDatePolicy, DueDateRule, OffsetUnit};
pub use period::{CompletionTally, Period, PeriodStatus, PeriodTransition, TaskInstance, TaskStatus};
pub use plan::{Eligibility, PeriodPlan, PeriodWalk, PlannedTask, plan_period};
pub use recurrence::{PeriodOffset, RecurrencePattern};
pub use service::ServiceTemplate;
pub use template::{ExpandedDue, TaskTemplate, expand};
pub use work_order::{WorkOrder, WorkOrderStatus};
