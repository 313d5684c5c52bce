//! Point lookups of previously recorded values.

use crate::error::Result;
use crate::metric::Metric;
use crate::storage::{MetricScope, MetricStore};
use crate::types::{self, Amount, AssociationValue, Associations, MetricType};
use chrono::{DateTime, Utc};

/// Scope of a `latest` or `last` lookup.
#[derive(Debug, Clone, Default)]
pub struct LatestOptions {
    /// Only records strictly before this time
    pub before: Option<DateTime<Utc>>,
    /// Only records strictly after this time
    pub after: Option<DateTime<Utc>>,
    pub associations: Associations,
}

impl LatestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, time: DateTime<Utc>) -> Self {
        self.before = Some(time);
        self
    }

    pub fn after(mut self, time: DateTime<Utc>) -> Self {
        self.after = Some(time);
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
}

/// The most recently inserted record in scope.
pub async fn last(
    store: &dyn MetricStore,
    metric_type: &dyn MetricType,
    options: &LatestOptions,
) -> Result<Option<Metric>> {
    let type_id = types::validate(metric_type)?;
    let mut scope = MetricScope::new(type_id, metric_type.scope_filters(&options.associations)?);
    scope.before = options.before;
    scope.after = options.after;
    store.last(&scope).await
}

/// The transformed amount of the most recent record in scope, or of zero.
pub async fn latest(
    store: &dyn MetricStore,
    metric_type: &dyn MetricType,
    options: &LatestOptions,
) -> Result<Amount> {
    let amount = last(store, metric_type, options)
        .await?
        .map(|metric| metric.amount)
        .unwrap_or(0.0);
    Ok(metric_type.transform_amount(amount, &options.associations))
}
