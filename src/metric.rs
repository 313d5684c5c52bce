//! Metric records and their denormalized time parts.

use crate::types::Associations;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

/// Number of generic association columns available on every record.
pub const ASSOCIATION_SLOTS: usize = 5;

/// Amount stored when a record does not specify one.
pub const DEFAULT_AMOUNT: f64 = 1.0;

/// Calendar parts of a record's time, derived once at creation and used as
/// indexed bucketing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// ISO 8601 (commercial) week number
    pub week_of_year: u32,
}

impl TimeParts {
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            hour: time.hour(),
            week_of_year: time.iso_week().week(),
        }
    }
}

/// A metric that has been built by the recorder but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetric {
    pub type_id: i32,
    /// `None` until the amount is resolved; type hooks may set it.
    pub amount: Option<f64>,
    pub time: DateTime<Utc>,
    pub associations: [Option<i64>; ASSOCIATION_SLOTS],
}

impl NewMetric {
    pub fn new(type_id: i32, time: DateTime<Utc>) -> Self {
        Self {
            type_id,
            amount: None,
            time,
            associations: [None; ASSOCIATION_SLOTS],
        }
    }

    /// Set the value of a 1-based association slot. Out of range slots are ignored.
    pub fn set_association(&mut self, slot: u8, value: Option<i64>) {
        if let Some(entry) = slot_index(slot).and_then(|i| self.associations.get_mut(i)) {
            *entry = value;
        }
    }

    pub fn association(&self, slot: u8) -> Option<i64> {
        slot_index(slot).and_then(|i| self.associations[i])
    }

    pub fn time_parts(&self) -> TimeParts {
        TimeParts::from_time(self.time)
    }

    /// The amount that will be written, falling back to [`DEFAULT_AMOUNT`].
    pub fn resolved_amount(&self) -> f64 {
        self.amount.unwrap_or(DEFAULT_AMOUNT)
    }
}

/// A persisted metric record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub id: i64,
    pub type_id: i32,
    pub amount: f64,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub parts: TimeParts,
    pub associations: [Option<i64>; ASSOCIATION_SLOTS],
}

impl Metric {
    pub fn association(&self, slot: u8) -> Option<i64> {
        slot_index(slot).and_then(|i| self.associations[i])
    }
}

/// Options accepted when recording a metric.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub time: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
    pub associations: Associations,
}

impl RecordOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn association(
        mut self,
        name: impl Into<String>,
        value: impl Into<crate::types::AssociationValue>,
    ) -> Self {
        self.associations.insert(name, value);
        self
    }

    pub fn associations(mut self, associations: Associations) -> Self {
        self.associations = associations;
        self
    }
}

fn slot_index(slot: u8) -> Option<usize> {
    let slot = usize::from(slot);
    (1..=ASSOCIATION_SLOTS).contains(&slot).then(|| slot - 1)
}
