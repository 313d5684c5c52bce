//! Bucket boundaries for time windows.
//!
//! A window is `quantity` consecutive calendar units ending with the unit that
//! contains the requested end time. Month and year arithmetic is calendar
//! aware, weeks are ISO weeks starting on Monday.

use crate::error::{Result, RollupError};
use crate::storage::TimePart;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Group {
    pub const ALL: [Group; 5] = [Group::Hour, Group::Day, Group::Week, Group::Month, Group::Year];

    /// Number of buckets gathered when no quantity is given
    pub fn default_quantity(self) -> u32 {
        match self {
            Group::Hour => 24,
            Group::Day => 30,
            Group::Week => 6,
            Group::Month => 12,
            Group::Year => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Hour => "hour",
            Group::Day => "day",
            Group::Week => "week",
            Group::Month => "month",
            Group::Year => "year",
        }
    }

    /// Record columns a grouped aggregation uses for this granularity.
    pub fn time_parts(self) -> Vec<TimePart> {
        match self {
            Group::Hour => vec![TimePart::Year, TimePart::Month, TimePart::Day, TimePart::Hour],
            Group::Day => vec![TimePart::Year, TimePart::Month, TimePart::Day],
            Group::Week => vec![TimePart::IsoYear, TimePart::WeekOfYear],
            Group::Month => vec![TimePart::Year, TimePart::Month],
            Group::Year => vec![TimePart::Year],
        }
    }

    /// Start of the unit containing `time`.
    pub fn start_of(self, time: DateTime<Utc>) -> DateTime<Utc> {
        let date = time.date_naive();
        let start = match self {
            Group::Hour => date.and_hms_opt(time.hour(), 0, 0),
            Group::Day => date.and_hms_opt(0, 0, 0),
            Group::Week => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_hms_opt(0, 0, 0)
            }
            Group::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            Group::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        start.map(|t| t.and_utc()).unwrap_or(time)
    }

    /// Last microsecond of the unit containing `time`.
    pub fn end_of(self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.advance(self.start_of(time), 1)
            .map(|next| next - Duration::microseconds(1))
    }

    /// Move `time` by `units` whole units. Months clamp to the last day.
    pub fn advance(self, time: DateTime<Utc>, units: i64) -> Option<DateTime<Utc>> {
        match self {
            Group::Hour => time.checked_add_signed(Duration::try_hours(units)?),
            Group::Day => time.checked_add_signed(Duration::try_days(units)?),
            Group::Week => time.checked_add_signed(Duration::try_weeks(units)?),
            Group::Month => shift_months(time, units),
            Group::Year => shift_months(time, units.checked_mul(12)?),
        }
    }

    /// Canonical bucket time for the values of [`Group::time_parts`].
    pub fn bucket_time(self, key: &[i32]) -> Option<DateTime<Utc>> {
        let part = |i: usize| key.get(i).copied();
        let unsigned = |i: usize| part(i).and_then(|v| u32::try_from(v).ok());
        let date = match self {
            Group::Hour | Group::Day => NaiveDate::from_ymd_opt(part(0)?, unsigned(1)?, unsigned(2)?),
            Group::Week => NaiveDate::from_isoywd_opt(part(0)?, unsigned(1)?, Weekday::Mon),
            Group::Month => NaiveDate::from_ymd_opt(part(0)?, unsigned(1)?, 1),
            Group::Year => NaiveDate::from_ymd_opt(part(0)?, 1, 1),
        }?;
        let hour = if self == Group::Hour { unsigned(3)? } else { 0 };
        date.and_hms_opt(hour, 0, 0).map(|t: NaiveDateTime| t.and_utc())
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Group {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(Group::Hour),
            "day" => Ok(Group::Day),
            "week" => Ok(Group::Week),
            "month" => Ok(Group::Month),
            "year" => Ok(Group::Year),
            other => Err(RollupError::InvalidGroupForGathering(format!(
                "{other} is not a valid group, use one of hour, day, week, month or year"
            ))),
        }
    }
}

fn shift_months(time: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        time.checked_add_months(magnitude)
    } else {
        time.checked_sub_months(magnitude)
    }
}

/// A closed time range split into equal calendar buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    pub group: Group,
    pub quantity: u32,
    /// Start of the first bucket
    pub start_time: DateTime<Utc>,
    /// Last microsecond of the last bucket
    pub end_time: DateTime<Utc>,
    #[serde(skip)]
    buckets: Vec<DateTime<Utc>>,
}

impl Window {
    /// The `quantity` buckets up to and including the one containing `end`.
    pub fn new(group: Group, quantity: u32, end: DateTime<Utc>) -> Result<Self> {
        if quantity == 0 {
            return Err(RollupError::InvalidQuantityForGathering(
                "At least one bucket must be gathered".to_string(),
            ));
        }
        let out_of_range = || {
            RollupError::InvalidQuantityForGathering(format!(
                "{quantity} {group} buckets ending at {end} are out of range"
            ))
        };

        let end_time = group.end_of(end).ok_or_else(out_of_range)?;
        let start_time = group
            .advance(group.start_of(end), -(i64::from(quantity) - 1))
            .ok_or_else(out_of_range)?;

        let buckets = (0..i64::from(quantity))
            .map(|i| group.advance(start_time, i))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(out_of_range)?;

        Ok(Self {
            group,
            quantity,
            start_time,
            end_time,
            buckets,
        })
    }

    /// Start times of every bucket, oldest first.
    pub fn buckets(&self) -> &[DateTime<Utc>] {
        &self.buckets
    }

    /// The window of the same size ending just before this one starts.
    pub fn previous(&self) -> Result<Self> {
        let end = self.group.advance(self.start_time, -1).ok_or_else(|| {
            RollupError::InvalidQuantityForGathering(format!(
                "No {} window exists before {}",
                self.group, self.start_time
            ))
        })?;
        Window::new(self.group, self.quantity, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn last_micro(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        at(y, m, d, h, 59) + Duration::seconds(59) + Duration::microseconds(999_999)
    }

    #[test]
    fn test_group_parsing() {
        assert_eq!("hour".parse::<Group>().unwrap(), Group::Hour);
        assert_eq!(" Week ".parse::<Group>().unwrap(), Group::Week);
        let err = "fortnight".parse::<Group>().unwrap_err();
        assert_eq!(err.code(), "InvalidGroupForGathering");
        for group in Group::ALL {
            assert_eq!(group.to_string().parse::<Group>().unwrap(), group);
        }
    }

    #[test]
    fn test_hour_window() {
        let window = Window::new(Group::Hour, 24, at(2019, 10, 20, 16, 23)).unwrap();
        assert_eq!(window.start_time, at(2019, 10, 19, 17, 0));
        assert_eq!(window.end_time, last_micro(2019, 10, 20, 16));
        assert_eq!(window.buckets().len(), 24);
        assert_eq!(window.buckets()[23], at(2019, 10, 20, 16, 0));
    }

    #[test]
    fn test_day_window() {
        let window = Window::new(Group::Day, 30, at(2019, 10, 20, 16, 23)).unwrap();
        assert_eq!(window.start_time, at(2019, 9, 21, 0, 0));
        assert_eq!(window.end_time, last_micro(2019, 10, 20, 23));
    }

    #[test]
    fn test_week_window() {
        // Thursday 24th October 2019
        let window = Window::new(Group::Week, 6, at(2019, 10, 24, 9, 0)).unwrap();
        assert_eq!(window.start_time, at(2019, 9, 16, 0, 0));
        assert_eq!(window.end_time, last_micro(2019, 10, 27, 23));
        for bucket in window.buckets() {
            assert_eq!(bucket.weekday(), Weekday::Mon);
        }
    }

    #[test]
    fn test_month_window() {
        let window = Window::new(Group::Month, 12, at(2019, 10, 31, 16, 0)).unwrap();
        assert_eq!(window.start_time, at(2018, 11, 1, 0, 0));
        assert_eq!(window.end_time, last_micro(2019, 10, 31, 23));
        assert_eq!(window.buckets()[3], at(2019, 2, 1, 0, 0));
    }

    #[test]
    fn test_year_window() {
        let window = Window::new(Group::Year, 3, at(2019, 10, 20, 16, 23)).unwrap();
        assert_eq!(window.start_time, at(2017, 1, 1, 0, 0));
        assert_eq!(window.end_time, last_micro(2019, 12, 31, 23));
        assert_eq!(
            window.buckets(),
            &[at(2017, 1, 1, 0, 0), at(2018, 1, 1, 0, 0), at(2019, 1, 1, 0, 0)]
        );
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let err = Window::new(Group::Day, 0, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "InvalidQuantityForGathering");
    }

    #[test]
    fn test_previous_window_is_adjacent() {
        let window = Window::new(Group::Month, 3, at(2019, 3, 15, 0, 0)).unwrap();
        let previous = window.previous().unwrap();
        assert_eq!(previous.start_time, at(2018, 10, 1, 0, 0));
        assert_eq!(previous.end_time + Duration::microseconds(1), window.start_time);
        assert_eq!(previous.quantity, 3);
    }

    #[test]
    fn test_bucket_time() {
        assert_eq!(
            Group::Hour.bucket_time(&[2019, 10, 20, 16]),
            Some(at(2019, 10, 20, 16, 0))
        );
        assert_eq!(Group::Week.bucket_time(&[2025, 1]), Some(at(2024, 12, 30, 0, 0)));
        assert_eq!(Group::Month.bucket_time(&[2019, 13]), None);
        assert_eq!(Group::Year.bucket_time(&[]), None);
    }
}
