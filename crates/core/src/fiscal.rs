//! Fiscal years.

use chrono::{Datelike, Days, Month, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// A tenant-configured 12-month accounting period.
///
/// A fiscal year starting in April 2026 runs 2026-04-01 through 2027-03-31
/// and is labeled by its starting calendar year.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalYear {
    begin: NaiveDate,
    end: NaiveDate,
}

impl FiscalYear {
    /// The fiscal year starting on the first day of `start` in `year`.
    pub fn starting(year: i32, start: Month) -> Self {
        // The first day of a valid month always exists.
        let begin = NaiveDate::from_ymd_opt(year, start.number_from_month(), 1)
            .expect("first day of a valid month");
        let end = begin + Months::new(12) - Days::new(1);
        Self { begin, end }
    }

    /// The fiscal year containing `date`.
    pub fn containing(date: NaiveDate, start: Month) -> Self {
        let year = if date.month() >= start.number_from_month() {
            date.year()
        } else {
            date.year() - 1
        };
        Self::starting(year, start)
    }

    pub fn begin(&self) -> NaiveDate {
        self.begin
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Calendar year the period starts in; used as its label.
    pub fn year(&self) -> i32 {
        self.begin.year()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end
    }
}

impl ValueObject for FiscalYear {}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn calendar_aligned_year() {
        let fy = FiscalYear::starting(2026, Month::January);
        assert_eq!(fy.begin(), date(2026, 1, 1));
        assert_eq!(fy.end(), date(2026, 12, 31));
        assert_eq!(fy.year(), 2026);
    }

    #[test]
    fn offset_year_spans_two_calendar_years() {
        let fy = FiscalYear::starting(2026, Month::April);
        assert_eq!(fy.begin(), date(2026, 4, 1));
        assert_eq!(fy.end(), date(2027, 3, 31));
        assert!(fy.contains(date(2027, 2, 15)));
        assert!(!fy.contains(date(2027, 4, 1)));
    }

    #[test]
    fn containing_picks_the_started_period() {
        let fy = FiscalYear::containing(date(2026, 2, 10), Month::April);
        assert_eq!(fy.year(), 2025);

        let fy = FiscalYear::containing(date(2026, 4, 1), Month::April);
        assert_eq!(fy.year(), 2026);
    }
}
