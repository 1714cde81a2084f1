//! Period boundary calculation.
//!
//! Monthly, quarterly and half-yearly cycles follow the calendar. Yearly cycles
//! follow the Indian fiscal year (April 1 to March 31), not the calendar year.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use cadence_core::{DomainResult, ValueObject};

use crate::recurrence::{PeriodOffset, RecurrencePattern};

/// One cycle of a recurrence pattern: `[start, end]`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodWindow {
    pattern: RecurrencePattern,
    start: NaiveDate,
    end: NaiveDate,
}

impl ValueObject for PeriodWindow {}

impl PeriodWindow {
    /// The cycle of `pattern` that contains `date`.
    pub fn containing(pattern: RecurrencePattern, date: NaiveDate) -> Self {
        let start = cycle_start(pattern, date);
        Self::starting_at(pattern, start)
    }

    fn starting_at(pattern: RecurrencePattern, start: NaiveDate) -> Self {
        let end = start
            .checked_add_months(Months::new(pattern.months()))
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Self {
            pattern,
            start,
            end,
        }
    }

    pub fn pattern(&self) -> RecurrencePattern {
        self.pattern
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &PeriodWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Shift by whole cycles. Shifting moves the cycle start by whole months, so
    /// month-length differences never leak into the result.
    pub fn shifted(&self, cycles: i32) -> Option<Self> {
        let months = Months::new(self.pattern.months() * cycles.unsigned_abs());
        let start = if cycles >= 0 {
            self.start.checked_add_months(months)?
        } else {
            self.start.checked_sub_months(months)?
        };
        Some(Self::starting_at(self.pattern, start))
    }

    pub fn next(&self) -> Option<Self> {
        self.shifted(1)
    }

    pub fn previous(&self) -> Option<Self> {
        self.shifted(-1)
    }

    /// Display name, e.g. `October 2025`, `Q4 2025`, `H2 2025`, `FY 2024-25`.
    pub fn name(&self) -> String {
        match self.pattern {
            RecurrencePattern::Monthly => self.start.format("%B %Y").to_string(),
            RecurrencePattern::Quarterly => {
                format!("Q{} {}", quarter_of(self.start), self.start.year())
            }
            RecurrencePattern::HalfYearly => {
                format!("H{} {}", half_of(self.start), self.start.year())
            }
            RecurrencePattern::Yearly => fiscal_year_label(self.start.year(), " "),
        }
    }

    /// Label used to decorate sub-cycle task titles, e.g. `Jan`, `Q1`, `H2`.
    pub fn short_label(&self) -> String {
        match self.pattern {
            RecurrencePattern::Monthly => self.start.format("%b").to_string(),
            RecurrencePattern::Quarterly => format!("Q{}", quarter_of(self.start)),
            RecurrencePattern::HalfYearly => format!("H{}", half_of(self.start)),
            RecurrencePattern::Yearly => fiscal_year_label(self.start.year(), " "),
        }
    }

    /// Canonical identifier: `2025-10`, `2025-Q4`, `2025-H2`, `FY2024-25`.
    ///
    /// Due-date override maps are keyed by this value.
    pub fn key(&self) -> String {
        match self.pattern {
            RecurrencePattern::Monthly => self.start.format("%Y-%m").to_string(),
            RecurrencePattern::Quarterly => {
                format!("{}-Q{}", self.start.year(), quarter_of(self.start))
            }
            RecurrencePattern::HalfYearly => {
                format!("{}-H{}", self.start.year(), half_of(self.start))
            }
            RecurrencePattern::Yearly => fiscal_year_label(self.start.year(), ""),
        }
    }
}

/// Period boundaries for `pattern` relative to `reference`.
///
/// `PeriodOffset::Previous` steps back exactly one cycle from the cycle that
/// contains `reference`; `Next` steps forward one. Dates within a year of
/// chrono's representable range are clamped to the containing cycle.
pub fn calculate(
    pattern: RecurrencePattern,
    reference: NaiveDate,
    offset: PeriodOffset,
) -> PeriodWindow {
    let base = PeriodWindow::containing(pattern, reference);
    base.shifted(offset.cycles()).unwrap_or(base)
}

/// Same as [`calculate`] for a pattern name coming from storage or user input.
///
/// Unknown names yield `DomainError::InvalidPattern`; callers decide whether to
/// fall back to monthly.
pub fn calculate_named(
    pattern: &str,
    reference: NaiveDate,
    offset: PeriodOffset,
) -> DomainResult<PeriodWindow> {
    let pattern = RecurrencePattern::parse(pattern)?;
    Ok(calculate(pattern, reference, offset))
}

fn cycle_start(pattern: RecurrencePattern, date: NaiveDate) -> NaiveDate {
    let (year, month) = (date.year(), date.month());
    match pattern {
        RecurrencePattern::Monthly => first_of(year, month),
        RecurrencePattern::Quarterly => first_of(year, ((month - 1) / 3) * 3 + 1),
        RecurrencePattern::HalfYearly => first_of(year, if month <= 6 { 1 } else { 7 }),
        RecurrencePattern::Yearly => {
            if month >= 4 {
                first_of(year, 4)
            } else {
                first_of(year - 1, 4)
            }
        }
    }
}

pub(crate) fn first_of(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

pub(crate) fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    first_of(date.year(), date.month())
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

fn half_of(date: NaiveDate) -> u32 {
    if date.month() <= 6 { 1 } else { 2 }
}

fn fiscal_year_label(start_year: i32, sep: &str) -> String {
    format!("FY{sep}{}-{:02}", start_year, (start_year + 1).rem_euclid(100))
}
