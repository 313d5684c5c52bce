//! Recording of new metric records.

use crate::clock::Clock;
use crate::error::{Result, RollupError};
use crate::history::{self, LatestOptions};
use crate::lock::{LockOptions, LockProvider, CUMULATIVE_LOCK_KEY};
use crate::metric::{Metric, NewMetric, RecordOptions};
use crate::storage::MetricStore;
use crate::types::{self, MetricType};
use chrono::SubsecRound;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validates and persists records, keeping cumulative totals consistent.
pub struct Recorder {
    store: Arc<dyn MetricStore>,
    lock_provider: Arc<dyn LockProvider>,
    lock_options: LockOptions,
    clock: Arc<dyn Clock>,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn MetricStore>,
        lock_provider: Arc<dyn LockProvider>,
        lock_options: LockOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            lock_provider,
            lock_options,
            clock,
        }
    }

    pub async fn record(&self, metric_type: &dyn MetricType, options: RecordOptions) -> Result<Metric> {
        let type_id = types::validate(metric_type)?;

        let mut metric = NewMetric::new(type_id, options.time.unwrap_or_else(|| self.clock.now()));
        metric_type.on_record(&mut metric, &options)?;
        // Stored times have microsecond precision
        metric.time = metric.time.trunc_subsecs(6);
        metric_type.copy_associations(&mut metric, &options.associations)?;
        if metric.amount.is_none() {
            metric.amount = options.amount;
        }

        if !metric_type.cumulative() {
            return self.store.insert(&metric).await;
        }

        let _guard = self
            .lock_provider
            .acquire(CUMULATIVE_LOCK_KEY, &self.lock_options)
            .await?;

        let scope = LatestOptions::new().associations(options.associations.clone());
        let newer = history::last(self.store.as_ref(), metric_type, &scope.clone().after(metric.time)).await?;
        if let Some(newer) = newer {
            warn!(
                type_id,
                time = %metric.time,
                newer_id = newer.id,
                "Rejected historical cumulative metric"
            );
            return Err(RollupError::CannotAddHistoricalCumulativeMetrics(format!(
                "A {} metric already exists after {}",
                metric_type.name(),
                metric.time
            )));
        }

        let previous = history::latest(self.store.as_ref(), metric_type, &scope).await?;
        let delta = metric_type.transform_amount(metric.resolved_amount(), &options.associations);
        let total = previous + delta;
        debug!(type_id, previous = %previous, delta = %delta, "Accumulating metric");
        metric.amount = Some(total.as_f64());

        self.store.insert(&metric).await
    }
}
