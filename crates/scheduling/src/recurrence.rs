//! Recurrence vocabulary.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use cadence_core::{DomainError, DomainResult};

/// How often a work order (or a task template) recurs.
///
/// Variants are declared from finest to coarsest, so `Ord` compares granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Monthly,
    Quarterly,
    HalfYearly,
    /// Fiscal year, April 1 to March 31.
    Yearly,
}

impl RecurrencePattern {
    pub const ALL: [RecurrencePattern; 4] = [
        RecurrencePattern::Monthly,
        RecurrencePattern::Quarterly,
        RecurrencePattern::HalfYearly,
        RecurrencePattern::Yearly,
    ];

    /// Length of one cycle in calendar months.
    pub fn months(self) -> u32 {
        match self {
            RecurrencePattern::Monthly => 1,
            RecurrencePattern::Quarterly => 3,
            RecurrencePattern::HalfYearly => 6,
            RecurrencePattern::Yearly => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Quarterly => "quarterly",
            RecurrencePattern::HalfYearly => "half_yearly",
            RecurrencePattern::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(RecurrencePattern::Monthly),
            "quarterly" => Ok(RecurrencePattern::Quarterly),
            "half_yearly" | "half-yearly" | "halfyearly" => Ok(RecurrencePattern::HalfYearly),
            "yearly" | "annual" | "annually" => Ok(RecurrencePattern::Yearly),
            other => Err(DomainError::invalid_pattern(other.to_string())),
        }
    }

    pub fn is_finer_than(self, other: RecurrencePattern) -> bool {
        self.months() < other.months()
    }
}

impl FromStr for RecurrencePattern {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cycle, relative to a reference date, a calculation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOffset {
    /// The cycle before the one containing the reference date.
    Previous,
    /// The cycle containing the reference date.
    #[default]
    Current,
    /// The cycle after the one containing the reference date.
    Next,
}

impl PeriodOffset {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodOffset::Previous => "previous",
            PeriodOffset::Current => "current",
            PeriodOffset::Next => "next",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous" => Ok(PeriodOffset::Previous),
            "current" => Ok(PeriodOffset::Current),
            "next" => Ok(PeriodOffset::Next),
            other => Err(DomainError::validation(format!("unknown period offset: {other}"))),
        }
    }

    pub(crate) fn cycles(self) -> i32 {
        match self {
            PeriodOffset::Previous => -1,
            PeriodOffset::Current => 0,
            PeriodOffset::Next => 1,
        }
    }
}
