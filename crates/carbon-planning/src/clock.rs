//! Time source for month cutoffs

use chrono::{NaiveDate, Utc};

use crate::period::YearMonth;

/// Supplies today's date
pub trait Clock: Send + Sync {
    /// Current calendar date
    fn today(&self) -> NaiveDate;

    /// Last fully elapsed month
    fn last_complete_month(&self) -> YearMonth {
        YearMonth::last_complete_before(self.today())
    }
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to one date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
