//! Task templates and their expansion into dated occurrences.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::{DomainError, DomainResult, Entity, ServiceId, TaskTemplateId, UserId};

use crate::calendar::PeriodWindow;
use crate::due_date::DueDatePolicy;
use crate::recurrence::RecurrencePattern;

/// A recurring checklist item defined once per service.
///
/// `frequency` may be finer than the work order's pattern (a monthly template
/// inside a quarterly work order yields three occurrences per period) but
/// never coarser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TaskTemplateId,
    pub service_id: ServiceId,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub frequency: RecurrencePattern,
    pub due: DueDatePolicy,
    pub sort_order: i32,
    pub default_assignee: Option<UserId>,
}

impl TaskTemplate {
    pub fn new(
        service_id: ServiceId,
        title: impl Into<String>,
        frequency: RecurrencePattern,
        due: DueDatePolicy,
    ) -> DomainResult<Self> {
        let template = Self {
            id: TaskTemplateId::new(),
            service_id,
            title: title.into(),
            description: None,
            is_active: true,
            frequency,
            due,
            sort_order: 0,
            default_assignee: None,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("task template title cannot be empty"));
        }
        self.due.validate()
    }

    /// Whether the template may be scheduled inside periods of `pattern`.
    pub fn fits(&self, pattern: RecurrencePattern) -> bool {
        !pattern.is_finer_than(self.frequency)
    }

    /// Title for one occurrence, decorated with the sub-cycle label when the
    /// template recurs at a different granularity than its period.
    pub fn instance_title(&self, sub_label: Option<&str>) -> String {
        match sub_label {
            Some(label) => format!("{} - {}", self.title, label),
            None => self.title.clone(),
        }
    }
}

impl Entity for TaskTemplate {
    type Id = TaskTemplateId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// One dated occurrence of a template inside a period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedDue {
    pub due_date: NaiveDate,
    pub sub_label: Option<String>,
    /// The template-frequency cycle this occurrence covers.
    pub cycle: PeriodWindow,
}

/// Expand one template against one period.
///
/// Every cycle of the template's own frequency whose end date falls inside
/// `period` yields one occurrence. Occurrences due before `anchor` are dropped.
/// Inactive templates, and templates coarser than the period, yield nothing.
pub fn expand(template: &TaskTemplate, period: &PeriodWindow, anchor: NaiveDate) -> Vec<ExpandedDue> {
    if !template.is_active || !template.fits(period.pattern()) {
        return Vec::new();
    }

    let labelled = template.frequency != period.pattern();
    let mut out = Vec::new();
    let mut cycle = PeriodWindow::containing(template.frequency, period.start());

    while cycle.start() <= period.end() {
        if period.contains(cycle.end()) {
            let due_date = template.due.resolve(&cycle);
            if due_date >= anchor {
                out.push(ExpandedDue {
                    due_date,
                    sub_label: labelled.then(|| cycle.short_label()),
                    cycle,
                });
            }
        }
        match cycle.next() {
            Some(next) => cycle = next,
            None => break,
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::calculate;
    use crate::due_date::DueDateRule;
    use crate::recurrence::PeriodOffset;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn template(frequency: RecurrencePattern, due: DueDatePolicy) -> TaskTemplate {
        TaskTemplate::new(ServiceId::new(), "Bookkeeping", frequency, due).unwrap()
    }

    fn window(pattern: RecurrencePattern, date: NaiveDate) -> PeriodWindow {
        calculate(pattern, date, PeriodOffset::Current)
    }

    #[test]
    fn monthly_template_in_quarterly_period_yields_three_occurrences() {
        let t = template(
            RecurrencePattern::Monthly,
            DueDatePolicy::with_rule(DueDateRule::days_after_end(5)),
        );
        let q1 = window(RecurrencePattern::Quarterly, d(2025, 1, 1));

        let due: Vec<_> = expand(&t, &q1, d(2025, 1, 1))
            .into_iter()
            .map(|e| (e.due_date, e.sub_label))
            .collect();

        assert_eq!(
            due,
            vec![
                (d(2025, 2, 5), Some("Jan".to_string())),
                (d(2025, 3, 5), Some("Feb".to_string())),
                (d(2025, 4, 5), Some("Mar".to_string())),
            ]
        );
    }

    #[test]
    fn equal_frequency_yields_one_unlabelled_occurrence() {
        let t = template(
            RecurrencePattern::Monthly,
            DueDatePolicy::with_rule(DueDateRule::FixedDayOfMonth {
                day: 20,
                months_after_end: 1,
            }),
        );
        let oct = window(RecurrencePattern::Monthly, d(2025, 10, 1));
        let out = expand(&t, &oct, d(2025, 1, 1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].due_date, d(2025, 11, 20));
        assert_eq!(out[0].sub_label, None);
    }

    #[test]
    fn coarser_template_is_never_expanded() {
        let t = template(RecurrencePattern::Yearly, DueDatePolicy::default());
        let mar = window(RecurrencePattern::Monthly, d(2025, 3, 1));
        let fy = window(RecurrencePattern::Yearly, d(2025, 3, 1));

        assert!(!t.fits(RecurrencePattern::Monthly));
        assert!(expand(&t, &mar, d(2024, 4, 1)).is_empty());

        assert!(t.fits(RecurrencePattern::Yearly));
        let out = expand(&t, &fy, d(2024, 4, 1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].due_date, d(2025, 3, 31));
    }

    #[test]
    fn occurrences_before_anchor_are_discarded() {
        let t = template(RecurrencePattern::Monthly, DueDatePolicy::default());
        let q1 = window(RecurrencePattern::Quarterly, d(2025, 1, 1));
        let out = expand(&t, &q1, d(2025, 2, 15));
        let due: Vec<_> = out.iter().map(|e| e.due_date).collect();
        assert_eq!(due, vec![d(2025, 2, 28), d(2025, 3, 31)]);
    }

    #[test]
    fn override_keyed_by_sub_cycle() {
        let t = template(
            RecurrencePattern::Monthly,
            DueDatePolicy::with_rule(DueDateRule::days_after_end(5))
                .with_override("2025-02", d(2025, 3, 12)),
        );
        let q1 = window(RecurrencePattern::Quarterly, d(2025, 1, 1));
        let due: Vec<_> = expand(&t, &q1, d(2025, 1, 1))
            .into_iter()
            .map(|e| e.due_date)
            .collect();
        assert_eq!(due, vec![d(2025, 2, 5), d(2025, 3, 12), d(2025, 4, 5)]);
    }

    #[test]
    fn inactive_templates_are_skipped() {
        let mut t = template(RecurrencePattern::Monthly, DueDatePolicy::default());
        t.is_active = false;
        let oct = window(RecurrencePattern::Monthly, d(2025, 10, 1));
        assert!(expand(&t, &oct, d(2025, 1, 1)).is_empty());
    }

    #[test]
    fn titles_are_decorated_with_sub_labels() {
        let t = template(RecurrencePattern::Monthly, DueDatePolicy::default());
        assert_eq!(t.instance_title(Some("Jan")), "Bookkeeping - Jan");
        assert_eq!(t.instance_title(None), "Bookkeeping");
    }

    #[test]
    fn blank_titles_are_rejected() {
        let err = TaskTemplate::new(
            ServiceId::new(),
            "  ",
            RecurrencePattern::Monthly,
            DueDatePolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
