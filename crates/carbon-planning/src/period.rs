//! Calendar month arithmetic

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PlanningError;

/// A calendar month, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Create a month; `month` is 1-based
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// January of `year`
    pub fn first_of_year(year: i32) -> Self {
        Self { year, month: 1 }
    }

    /// December of `year`
    pub fn last_of_year(year: i32) -> Self {
        Self { year, month: 12 }
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1 to 12
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Zero-based calendar position (January = 0)
    pub fn month0(&self) -> usize {
        (self.month - 1) as usize
    }

    /// Months since year 0, used for distance arithmetic
    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: (ordinal.rem_euclid(12) + 1) as u32,
        }
    }

    /// Following month
    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    /// Preceding month
    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// Shift by `months`, negative values go back
    pub fn add_months(&self, months: i64) -> Self {
        Self::from_ordinal(self.ordinal() + months)
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(&self, other: YearMonth) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// First calendar day of the month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the month
    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Inclusive range of months; empty when `end < start`
    pub fn range_inclusive(start: YearMonth, end: YearMonth) -> impl Iterator<Item = YearMonth> {
        let count = (start.months_until(end) + 1).max(0);
        (0..count).map(move |offset| start.add_months(offset))
    }

    /// Last month that has fully elapsed as of `date`
    pub fn last_complete_before(date: NaiveDate) -> Self {
        Self::from_date(date).prev()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanningError::InvalidRange {
            start: s.to_string(),
            end: "expected YYYY-MM".to_string(),
        };
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_arithmetic_crosses_years() {
        let dec = YearMonth::new(2024, 12).unwrap();
        assert_eq!(dec.next(), YearMonth::new(2025, 1).unwrap());
        assert_eq!(YearMonth::new(2025, 1).unwrap().prev(), dec);
        assert_eq!(dec.add_months(-24), YearMonth::new(2022, 12).unwrap());
        assert_eq!(YearMonth::new(2023, 3).unwrap().months_until(dec), 21);
    }

    #[test]
    fn test_day_bounds() {
        let feb = YearMonth::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_range_inclusive() {
        let start = YearMonth::new(2023, 11).unwrap();
        let end = YearMonth::new(2024, 2).unwrap();
        let months: Vec<String> = YearMonth::range_inclusive(start, end)
            .map(|m| m.to_string())
            .collect();
        assert_eq!(months, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert_eq!(YearMonth::range_inclusive(end, start).count(), 0);
    }

    #[test]
    fn test_serde_as_string() {
        let month = YearMonth::new(2025, 7).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"2025-07\"");
        let parsed: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, month);
        assert!("2025-13".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_last_complete_month() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(
            YearMonth::last_complete_before(date),
            YearMonth::new(2025, 2).unwrap()
        );
    }
}
