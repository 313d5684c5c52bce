//! Storage backends for metric records.
//!
//! The rollup engine never touches SQL directly. It talks to a
//! [`MetricStore`], which persists records and answers the handful of
//! scoped lookups and grouped aggregations the engine needs:
//! - `duckdb`: embedded DuckDB database, file backed or in memory
//!
//! Backends must filter with plain equality on association slots, treating a
//! `None` filter value as `IS NULL`.

pub mod duckdb;

pub use self::duckdb::DuckDbBackend;

use crate::error::Result;
use crate::metric::{Metric, NewMetric};
use crate::types::SlotFilter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A calendar column (or derived expression) that aggregates group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePart {
    Year,
    Month,
    Day,
    Hour,
    WeekOfYear,
    /// ISO 8601 week-numbering year of the record time
    IsoYear,
}

/// Records of one type, narrowed by association filters and an optional
/// open time range.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricScope {
    pub type_id: i32,
    pub filters: Vec<SlotFilter>,
    /// Only records strictly before this time
    pub before: Option<DateTime<Utc>>,
    /// Only records strictly after this time
    pub after: Option<DateTime<Utc>>,
}

impl MetricScope {
    pub fn new(type_id: i32, filters: Vec<SlotFilter>) -> Self {
        Self {
            type_id,
            filters,
            before: None,
            after: None,
        }
    }

    pub fn before(mut self, time: DateTime<Utc>) -> Self {
        self.before = Some(time);
        self
    }

    pub fn after(mut self, time: DateTime<Utc>) -> Self {
        self.after = Some(time);
        self
    }
}

/// A grouped aggregation over a closed time range.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub type_id: i32,
    pub filters: Vec<SlotFilter>,
    /// Inclusive
    pub start: DateTime<Utc>,
    /// Inclusive
    pub end: DateTime<Utc>,
    /// Grouping columns, reported back in this order as [`AggregateRow::key`]
    pub parts: Vec<TimePart>,
    /// Additionally group by this association slot
    pub group_slot: Option<u8>,
}

/// One group of an [`AggregateQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Values of the grouping parts, in query order
    pub key: Vec<i32>,
    /// Value of the grouped association slot, if any
    pub slot_value: Option<i64>,
    pub sum: f64,
    pub count: i64,
    /// Highest record id in the group
    pub last_id: i64,
}

/// Storage backend trait for metric records.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Create the schema and indexes if they do not exist.
    async fn init(&self) -> Result<()>;

    /// Persist a new record and return it as stored.
    async fn insert(&self, metric: &NewMetric) -> Result<Metric>;

    /// The most recently inserted record in scope.
    async fn last(&self, scope: &MetricScope) -> Result<Option<Metric>>;

    /// Run a grouped `SUM`/`COUNT`/`MAX(id)` aggregation.
    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>>;

    /// Batch lookup by primary key. Missing ids are skipped.
    async fn fetch(&self, ids: &[i64]) -> Result<Vec<Metric>>;

    /// Number of records, optionally for one type.
    async fn count(&self, type_id: Option<i32>) -> Result<u64>;

    /// Delete records, optionally only those of one type. Returns the number deleted.
    async fn purge(&self, type_id: Option<i32>) -> Result<u64>;
}
