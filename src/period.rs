//! Calendar periods.
//!
//! A [`Period`] is a `(year, month)` pair. Documents and archives are grouped
//! by period, and acknowledgments are recorded per period. Ordering is
//! lexicographic on `(year, month)`, which the derived `Ord` gives us from
//! the field order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A calendar year-month pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Builds a period, rejecting months outside `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, LedgerError> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::InvalidPeriod(format!(
                "{}-{:02}: month out of range",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    /// The period a UTC timestamp falls in.
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// The period immediately after this one.
    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of the period (inclusive).
    pub fn start(self) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default();
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    /// First instant of the following period (exclusive upper bound).
    pub fn end(self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(self, ts: DateTime<Utc>) -> bool {
        Period::of(ts) == self
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = LedgerError;

    /// Parses `YYYY-MM` (surrounding whitespace allowed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || LedgerError::InvalidPeriod(format!("'{}' (expected YYYY-MM)", trimmed));

        let (year, month) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

/// Joins periods as `YYYY-MM, YYYY-MM, ...` in the order given.
pub fn format_periods(periods: &[Period]) -> String {
    periods
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
