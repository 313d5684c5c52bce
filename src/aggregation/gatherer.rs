//! Grouped aggregation of records into points.

use crate::aggregation::set::{Point, Set};
use crate::aggregation::window::{Group, Window};
use crate::error::{Result, RollupError};
use crate::metric::Metric;
use crate::storage::{AggregateQuery, MetricStore};
use crate::types::{self, Association, AssociationKey, AssociationValue, Associations, MetricType, SlotFilter};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Options of a gather.
#[derive(Debug, Clone, Default)]
pub struct GatherOptions {
    /// Number of buckets, defaults to [`Group::default_quantity`]
    pub quantity: Option<u32>,
    /// Any time in the last bucket, defaults to now
    pub end_time: Option<DateTime<Utc>>,
    pub associations: Associations,
    /// Split the result by the value of this association
    pub group_by: Option<String>,
}

impl GatherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn association(mut self, name: impl Into<String>, value: impl Into<AssociationValue>) -> Self {
        self.associations.insert(name, value);
        self
    }

    pub fn associations(mut self, associations: Associations) -> Self {
        self.associations = associations;
        self
    }

    pub fn group_by(mut self, name: impl Into<String>) -> Self {
        self.group_by = Some(name.into());
        self
    }
}

/// Result of a gather: one set, or one set per association value.
#[derive(Debug)]
pub enum Gathered {
    Single(Set),
    Grouped(BTreeMap<AssociationKey, Set>),
}

impl Gathered {
    pub fn into_set(self) -> Option<Set> {
        match self {
            Gathered::Single(set) => Some(set),
            Gathered::Grouped(_) => None,
        }
    }

    pub fn into_groups(self) -> Option<BTreeMap<AssociationKey, Set>> {
        match self {
            Gathered::Single(_) => None,
            Gathered::Grouped(groups) => Some(groups),
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    sum: f64,
    count: i64,
    last_id: i64,
}

/// Runs one grouped aggregation for a window and turns it into sets.
pub struct Gatherer {
    store: Arc<dyn MetricStore>,
    metric_type: Arc<dyn MetricType>,
    type_id: i32,
    window: Window,
    options: GatherOptions,
    group_by: Option<Association>,
}

impl Gatherer {
    /// Validate the type and options. `now` stands in for a missing end time.
    pub fn new(
        store: Arc<dyn MetricStore>,
        metric_type: Arc<dyn MetricType>,
        group: Group,
        options: GatherOptions,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let type_id = types::validate(metric_type.as_ref())?;

        let group_by = match &options.group_by {
            Some(name) => Some(metric_type.association(name).cloned().ok_or_else(|| {
                RollupError::InvalidAssociationForGathering(format!(
                    "The association {name} is not valid for {} metrics",
                    metric_type.name()
                ))
            })?),
            None => None,
        };

        let quantity = options.quantity.unwrap_or_else(|| group.default_quantity());
        let window = Window::new(group, quantity, options.end_time.unwrap_or(now))?;

        Ok(Self {
            store,
            metric_type,
            type_id,
            window,
            options,
            group_by,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub async fn gather(self) -> Result<Gathered> {
        let mut filters = self.metric_type.scope_filters(&self.options.associations)?;
        if let Some(association) = &self.group_by {
            // Every group is its own scope, only keep an explicit filter on the grouped slot
            if !self.options.associations.contains(&association.name) {
                filters.retain(|filter| filter.slot != association.slot);
            }
        }

        let query = AggregateQuery {
            type_id: self.type_id,
            filters: filters.clone(),
            start: self.window.start_time,
            end: self.window.end_time,
            parts: self.window.group.time_parts(),
            group_slot: self.group_by.as_ref().map(|association| association.slot),
        };
        let rows = self.store.aggregate(&query).await?;
        debug!(
            type_id = self.type_id,
            group = %self.window.group,
            rows = rows.len(),
            "Aggregated metrics"
        );

        let mut partitions: BTreeMap<Option<i64>, BTreeMap<DateTime<Utc>, Bucket>> = BTreeMap::new();
        for row in rows {
            let time = self.window.group.bucket_time(&row.key).ok_or_else(|| {
                RollupError::storage(format!("Aggregate key {:?} is not a valid bucket", row.key))
            })?;
            let bucket = partitions.entry(row.slot_value).or_default().entry(time).or_default();
            bucket.sum += row.sum;
            bucket.count += row.count;
            bucket.last_id = bucket.last_id.max(row.last_id);
        }

        let last_ids: Vec<i64> = partitions
            .values()
            .flat_map(|buckets| buckets.values().map(|bucket| bucket.last_id))
            .collect();
        let last_metrics: HashMap<i64, Metric> = self
            .store
            .fetch(&last_ids)
            .await?
            .into_iter()
            .map(|metric| (metric.id, metric))
            .collect();

        let Some(association) = self.group_by.clone() else {
            let buckets = partitions.remove(&None).unwrap_or_default();
            let points = self.points(buckets, &self.options.associations, &last_metrics);
            return Ok(Gathered::Single(self.set(self.options.associations.clone(), filters, points)));
        };

        let integers: Vec<i64> = partitions.keys().flatten().copied().collect();
        let resolved = self
            .metric_type
            .resolve_association_integers(&association.name, &integers)
            .await?;

        let mut groups = BTreeMap::new();
        for (slot_value, buckets) in partitions {
            let mut associations = self.options.associations.clone();
            if let Some(value) = slot_value {
                associations.insert(association.name.clone(), value);
            }
            let mut group_filters: Vec<SlotFilter> = filters
                .iter()
                .filter(|filter| filter.slot != association.slot)
                .copied()
                .collect();
            group_filters.push(SlotFilter {
                slot: association.slot,
                value: slot_value,
            });

            let key = match slot_value {
                Some(value) => resolved.get(&value).cloned().unwrap_or(AssociationKey::Id(value)),
                None => AssociationKey::None,
            };
            let points = self.points(buckets, &associations, &last_metrics);
            groups.insert(key, self.set(associations, group_filters, points));
        }

        Ok(Gathered::Grouped(groups))
    }

    fn points(
        &self,
        buckets: BTreeMap<DateTime<Utc>, Bucket>,
        associations: &Associations,
        last_metrics: &HashMap<i64, Metric>,
    ) -> Vec<Point> {
        buckets
            .into_iter()
            .map(|(time, bucket)| {
                let last = last_metrics.get(&bucket.last_id).map(|metric| metric.amount).unwrap_or(0.0);
                Point {
                    time,
                    sum: self.metric_type.transform_amount(bucket.sum, associations),
                    count: bucket.count,
                    last: self.metric_type.transform_amount(last, associations),
                }
            })
            .collect()
    }

    fn set(&self, associations: Associations, filters: Vec<SlotFilter>, points: Vec<Point>) -> Set {
        Set::new(
            self.metric_type.clone(),
            self.type_id,
            self.store.clone(),
            self.window.clone(),
            associations,
            filters,
            points,
        )
    }
}
