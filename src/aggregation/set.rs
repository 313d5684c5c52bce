//! Sparse and gap-filled point series.

use crate::aggregation::window::{Group, Window};
use crate::error::Result;
use crate::storage::{MetricScope, MetricStore};
use crate::types::{Amount, Associations, MetricType, SlotFilter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// The rollup of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Start of the bucket
    pub time: DateTime<Utc>,
    pub sum: Amount,
    pub count: i64,
    /// Amount of the most recent record at or before this bucket
    pub last: Amount,
}

/// The points gathered for one window and scope.
///
/// [`Set::points`] only holds buckets that had records. [`Set::filled`]
/// returns one point per bucket, carrying `last` forward through gaps.
pub struct Set {
    metric_type: Arc<dyn MetricType>,
    type_id: i32,
    store: Arc<dyn MetricStore>,
    window: Window,
    associations: Associations,
    filters: Vec<SlotFilter>,
    points: Vec<Point>,
    filled: OnceCell<Vec<Point>>,
}

impl Set {
    /// `filters` scope the lookup of the value carried into the first bucket.
    pub fn new(
        metric_type: Arc<dyn MetricType>,
        type_id: i32,
        store: Arc<dyn MetricStore>,
        window: Window,
        associations: Associations,
        filters: Vec<SlotFilter>,
        mut points: Vec<Point>,
    ) -> Self {
        points.sort_by_key(|point| point.time);
        Self {
            metric_type,
            type_id,
            store,
            window,
            associations,
            filters,
            points,
            filled: OnceCell::new(),
        }
    }

    pub fn metric_type(&self) -> &Arc<dyn MetricType> {
        &self.metric_type
    }

    pub fn group(&self) -> Group {
        self.window.group
    }

    pub fn quantity(&self) -> u32 {
        self.window.quantity
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.window.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.window.end_time
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn associations(&self) -> &Associations {
        &self.associations
    }

    /// Points of buckets that had records, oldest first.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn points_by_time(&self) -> HashMap<DateTime<Utc>, Point> {
        self.points.iter().map(|point| (point.time, *point)).collect()
    }

    /// One point for every bucket of the window.
    ///
    /// Computed on first call. When the first bucket is empty its `last`
    /// is looked up from the latest record before the window.
    pub async fn filled(&self) -> Result<&[Point]> {
        self.filled
            .get_or_try_init(|| self.fill())
            .await
            .map(Vec::as_slice)
    }

    async fn fill(&self) -> Result<Vec<Point>> {
        let by_time = self.points_by_time();
        let zero = self.metric_type.transform_amount(0.0, &self.associations);

        let mut filled: Vec<Point> = Vec::with_capacity(self.window.buckets().len());
        for time in self.window.buckets() {
            let point = match by_time.get(time) {
                Some(point) => *point,
                None => {
                    let last = match filled.last() {
                        Some(previous) => previous.last,
                        None => self.seed().await?,
                    };
                    Point {
                        time: *time,
                        sum: zero,
                        count: 0,
                        last,
                    }
                }
            };
            filled.push(point);
        }
        Ok(filled)
    }

    async fn seed(&self) -> Result<Amount> {
        let scope = MetricScope::new(self.type_id, self.filters.clone()).before(self.window.start_time);
        let amount = self
            .store
            .last(&scope)
            .await?
            .map(|metric| metric.amount)
            .unwrap_or(0.0);
        debug!(type_id = self.type_id, amount, "Seeded first empty bucket");
        Ok(self.metric_type.transform_amount(amount, &self.associations))
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("type", &self.metric_type.name())
            .field("window", &self.window)
            .field("associations", &self.associations)
            .field("points", &self.points)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DuckDbBackend;
    use crate::metric::NewMetric;
    use chrono::TimeZone;

    struct Picked;

    impl MetricType for Picked {
        fn id(&self) -> Option<i32> {
            Some(20)
        }

        fn name(&self) -> &str {
            "potatoes_picked"
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 10, d, h, 0, 0).unwrap()
    }

    fn point(time: DateTime<Utc>, sum: f64, count: i64, last: f64) -> Point {
        Point {
            time,
            sum: Amount::Decimal(sum),
            count,
            last: Amount::Decimal(last),
        }
    }

    #[tokio::test]
    async fn test_filled_carries_last_forward() {
        let store = Arc::new(DuckDbBackend::new_in_memory().unwrap());
        let window = Window::new(Group::Hour, 4, at(20, 13)).unwrap();
        let set = Set::new(
            Arc::new(Picked),
            20,
            store,
            window,
            Associations::new(),
            Vec::new(),
            vec![point(at(20, 11), 5.0, 2, 3.0)],
        );

        let filled = set.filled().await.unwrap();
        assert_eq!(filled.len(), 4);
        assert_eq!(filled[0].time, at(20, 10));
        assert_eq!(filled[0].last, 0.0);
        assert_eq!(filled[1], point(at(20, 11), 5.0, 2, 3.0));
        assert_eq!(filled[2].count, 0);
        assert_eq!(filled[2].sum, 0.0);
        assert_eq!(filled[2].last, 3.0);
        assert_eq!(filled[3].last, 3.0);
    }

    #[tokio::test]
    async fn test_first_empty_bucket_is_seeded_from_before_window() {
        let store = Arc::new(DuckDbBackend::new_in_memory().unwrap());
        let mut metric = NewMetric::new(20, at(18, 9));
        metric.amount = Some(458.0);
        store.insert(&metric).await.unwrap();

        let window = Window::new(Group::Hour, 3, at(20, 13)).unwrap();
        let set = Set::new(
            Arc::new(Picked),
            20,
            store,
            window,
            Associations::new(),
            Vec::new(),
            Vec::new(),
        );

        let filled = set.filled().await.unwrap();
        assert!(filled.iter().all(|p| p.last == 458.0 && p.count == 0));
        // Cached
        assert_eq!(set.filled().await.unwrap().len(), 3);
    }
}
