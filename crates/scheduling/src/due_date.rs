//! Due-date rules for task templates.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use cadence_core::{DomainError, DomainResult, ValueObject};

use crate::calendar::{PeriodWindow, first_of, last_day_of_month};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetUnit {
    Days,
    Weeks,
    Months,
}

/// How a due date is derived from the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DueDateRule {
    /// Day `day` of the month `months_after_end` months after the cycle's last
    /// month, clamped to that month's last day (day 31 in April is April 30).
    FixedDayOfMonth {
        day: u32,
        #[serde(default)]
        months_after_end: u32,
    },
    /// Signed offset from the cycle end date.
    OffsetFromEnd { amount: i32, unit: OffsetUnit },
    /// The cycle end date itself.
    CycleEnd,
}

impl ValueObject for DueDateRule {}

impl DueDateRule {
    pub fn days_after_end(amount: i32) -> Self {
        DueDateRule::OffsetFromEnd {
            amount,
            unit: OffsetUnit::Days,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            DueDateRule::FixedDayOfMonth { day, .. } if !(1..=31).contains(day) => Err(
                DomainError::validation(format!("day of month must be in 1..=31, got {day}")),
            ),
            _ => Ok(()),
        }
    }

    /// Apply the rule to a cycle end date. `None` only when the result leaves
    /// chrono's representable range.
    pub fn apply(&self, cycle_end: NaiveDate) -> Option<NaiveDate> {
        match *self {
            DueDateRule::FixedDayOfMonth {
                day,
                months_after_end,
            } => {
                let month = first_of(cycle_end.year(), cycle_end.month())
                    .checked_add_months(Months::new(months_after_end))?;
                let last = last_day_of_month(month);
                let day = day.clamp(1, last.day());
                NaiveDate::from_ymd_opt(month.year(), month.month(), day)
            }
            DueDateRule::OffsetFromEnd { amount, unit } => match unit {
                OffsetUnit::Days => cycle_end
                    .checked_add_signed(chrono::Duration::days(i64::from(amount))),
                OffsetUnit::Weeks => cycle_end
                    .checked_add_signed(chrono::Duration::weeks(i64::from(amount))),
                OffsetUnit::Months => {
                    let months = Months::new(amount.unsigned_abs());
                    if amount >= 0 {
                        cycle_end.checked_add_months(months)
                    } else {
                        cycle_end.checked_sub_months(months)
                    }
                }
            },
            DueDateRule::CycleEnd => Some(cycle_end),
        }
    }
}

/// A template's complete due-date policy.
///
/// Resolution precedence: explicit override for the cycle's canonical key, then
/// the rule, then the cycle end date. Always resolves to a concrete date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDatePolicy {
    #[serde(default)]
    pub rule: Option<DueDateRule>,
    #[serde(default)]
    pub overrides: BTreeMap<String, NaiveDate>,
}

impl ValueObject for DueDatePolicy {}

impl DueDatePolicy {
    pub fn with_rule(rule: DueDateRule) -> Self {
        Self {
            rule: Some(rule),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, cycle_key: impl Into<String>, due: NaiveDate) -> Self {
        self.overrides.insert(cycle_key.into(), due);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        match &self.rule {
            Some(rule) => rule.validate(),
            None => Ok(()),
        }
    }

    pub fn resolve(&self, cycle: &PeriodWindow) -> NaiveDate {
        if let Some(due) = self.overrides.get(&cycle.key()) {
            return *due;
        }
        self.rule
            .as_ref()
            .and_then(|rule| rule.apply(cycle.end()))
            .unwrap_or(cycle.end())
    }
}
