//! The public facade of the rollup engine.
//!
//! An [`Engine`] owns the metric store, the lock provider used for cumulative
//! writes, the clock and the registry of known metric types. Build one with
//! [`Engine::builder`] or from configuration with [`Engine::from_config`].

use crate::aggregation::{ComparedSet, GatherOptions, Gathered, Gatherer, Group, Set};
use crate::clock::{Clock, SystemClock};
use crate::config::{LockStrategy, RollupConfig};
use crate::error::{Result, RollupError};
use crate::history::{self, LatestOptions};
use crate::lock::{LocalLockProvider, LockOptions, LockProvider};
use crate::metric::{Metric, RecordOptions};
use crate::recorder::Recorder;
use crate::storage::{DuckDbBackend, MetricStore};
use crate::types::{AssociationKey, Amount, ConfiguredType, MetricType, TypeRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Records metrics and rolls them up.
pub struct Engine {
    store: Arc<dyn MetricStore>,
    recorder: Recorder,
    clock: Arc<dyn Clock>,
    registry: TypeRegistry,
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn MetricStore>>,
    lock_provider: Option<Arc<dyn LockProvider>>,
    lock_strategy: LockStrategy,
    lock_options: LockOptions,
    clock: Option<Arc<dyn Clock>>,
    registry: TypeRegistry,
}

impl EngineBuilder {
    /// Defaults to an in-memory DuckDB database.
    pub fn store(mut self, store: Arc<dyn MetricStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an externally managed lock for cumulative writes.
    pub fn lock_provider(mut self, provider: Arc<dyn LockProvider>) -> Self {
        self.lock_provider = Some(provider);
        self
    }

    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.lock_strategy = strategy;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_options = self.lock_options.with_timeout(timeout);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn register(mut self, metric_type: Arc<dyn MetricType>) -> Result<Self> {
        self.registry.register(metric_type)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Engine> {
        let lock_provider: Arc<dyn LockProvider> = match (self.lock_provider, self.lock_strategy) {
            (Some(provider), _) => provider,
            (None, LockStrategy::Local) => Arc::new(LocalLockProvider::new()),
            (None, LockStrategy::External) => {
                return Err(RollupError::ConfigurationMissing(
                    "An external lock provider must be configured to record cumulative metrics".to_string(),
                ))
            }
        };
        let store: Arc<dyn MetricStore> = match self.store {
            Some(store) => store,
            None => Arc::new(DuckDbBackend::new_in_memory()?),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(Engine {
            recorder: Recorder::new(store.clone(), lock_provider, self.lock_options, clock.clone()),
            store,
            clock,
            registry: self.registry,
        })
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build an engine from configuration. An injected `lock_provider`
    /// satisfies the `external` lock strategy.
    pub fn from_config(config: &RollupConfig, lock_provider: Option<Arc<dyn LockProvider>>) -> Result<Self> {
        if config.storage.engine != "duckdb" {
            return Err(RollupError::Config(format!(
                "Unsupported storage engine: {}",
                config.storage.engine
            )));
        }

        let mut builder = Engine::builder()
            .store(Arc::new(DuckDbBackend::new(config.storage.connection.clone())?))
            .lock_strategy(config.lock.provider);
        if let Some(provider) = lock_provider {
            builder = builder.lock_provider(provider);
        }
        if let Some(secs) = config.lock.timeout_secs {
            builder = builder.lock_timeout(Duration::from_secs(secs));
        }
        for type_config in &config.types {
            builder = builder.register(Arc::new(ConfiguredType::new(type_config)))?;
        }

        info!(
            connection = %config.storage.connection,
            types = config.types.len(),
            "Engine configured"
        );
        builder.build()
    }

    /// Create the storage schema if needed.
    pub async fn init(&self) -> Result<()> {
        self.store.init().await
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Look up a registered type by id.
    pub fn metric_type(&self, id: i32) -> Result<Arc<dyn MetricType>> {
        self.registry.get(id)
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Record a new metric.
    #[instrument(skip_all, fields(metric_type = metric_type.name()))]
    pub async fn record(&self, metric_type: &dyn MetricType, options: RecordOptions) -> Result<Metric> {
        self.recorder.record(metric_type, options).await
    }

    /// The transformed amount of the most recent record in scope, zero if none.
    #[instrument(skip_all, fields(metric_type = metric_type.name()))]
    pub async fn latest(&self, metric_type: &dyn MetricType, options: &LatestOptions) -> Result<Amount> {
        history::latest(self.store.as_ref(), metric_type, options).await
    }

    /// The most recent record in scope.
    #[instrument(skip_all, fields(metric_type = metric_type.name()))]
    pub async fn last(&self, metric_type: &dyn MetricType, options: &LatestOptions) -> Result<Option<Metric>> {
        history::last(self.store.as_ref(), metric_type, options).await
    }

    /// Roll up one window. Returns one set per association value when
    /// `group_by` is given.
    #[instrument(skip_all, fields(metric_type = metric_type.name(), group = %group))]
    pub async fn gather(
        &self,
        metric_type: &Arc<dyn MetricType>,
        group: Group,
        options: GatherOptions,
    ) -> Result<Gathered> {
        Gatherer::new(self.store.clone(), metric_type.clone(), group, options, self.clock.now())?
            .gather()
            .await
    }

    /// Roll up one window split by the `group_by` association.
    #[instrument(skip_all, fields(metric_type = metric_type.name(), group = %group))]
    pub async fn gather_grouped(
        &self,
        metric_type: &Arc<dyn MetricType>,
        group: Group,
        options: GatherOptions,
    ) -> Result<BTreeMap<AssociationKey, Set>> {
        if options.group_by.is_none() {
            return Err(RollupError::InvalidAssociationForGathering(
                "An association to group by must be given".to_string(),
            ));
        }
        match self.gather(metric_type, group, options).await? {
            Gathered::Grouped(groups) => Ok(groups),
            Gathered::Single(_) => Err(RollupError::InvalidAssociationForGathering(
                "The gather was not grouped".to_string(),
            )),
        }
    }

    /// Roll up one window and the window of the same size before it, paired
    /// bucket by bucket.
    #[instrument(skip_all, fields(metric_type = metric_type.name(), group = %group))]
    pub async fn compare(
        &self,
        metric_type: &Arc<dyn MetricType>,
        group: Group,
        options: GatherOptions,
    ) -> Result<ComparedSet> {
        if options.group_by.is_some() {
            return Err(RollupError::IncomparableSets(
                "Grouped gathers cannot be compared".to_string(),
            ));
        }

        let now = self.clock.now();
        let current = Gatherer::new(self.store.clone(), metric_type.clone(), group, options.clone(), now)?;
        let previous_end = current.window().previous()?.end_time;
        let previous = Gatherer::new(
            self.store.clone(),
            metric_type.clone(),
            group,
            options.end_time(previous_end),
            now,
        )?;

        let a = single(current.gather().await?)?;
        let b = single(previous.gather().await?)?;
        ComparedSet::new(a, b).await
    }

    /// Delete recorded metrics, optionally only those of one type.
    #[instrument(skip(self))]
    pub async fn purge(&self, type_id: Option<i32>) -> Result<u64> {
        self.store.purge(type_id).await
    }
}

fn single(gathered: Gathered) -> Result<Set> {
    gathered
        .into_set()
        .ok_or_else(|| RollupError::IncomparableSets("Grouped gathers cannot be compared".to_string()))
}
