mod common;

use async_trait::async_trait;
use common::*;
use hyprstream_rollup::config::{LockStrategy, RollupConfig};
use hyprstream_rollup::lock::CUMULATIVE_LOCK_KEY;
use hyprstream_rollup::{
    Engine, GatherOptions, Group, LatestOptions, LocalLockProvider, LockGuard, LockOptions, LockProvider,
    RecordOptions, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts acquisitions and delegates to a local lock.
#[derive(Default)]
struct CountingLockProvider {
    inner: LocalLockProvider,
    acquired: AtomicUsize,
}

#[async_trait]
impl LockProvider for CountingLockProvider {
    async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockGuard> {
        assert_eq!(key, CUMULATIVE_LOCK_KEY);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire(key, options).await
    }
}

#[tokio::test]
async fn test_external_lock_requires_provider() {
    let err = Engine::builder()
        .lock_strategy(LockStrategy::External)
        .build()
        .err()
        .unwrap();
    assert_eq!(err.code(), "ConfigurationMissing");

    let provider = Arc::new(CountingLockProvider::default());
    let engine = Engine::builder()
        .lock_strategy(LockStrategy::External)
        .lock_provider(provider.clone())
        .build()
        .unwrap();

    engine.record(&TotalPotatoes, RecordOptions::new()).await.unwrap();
    engine.record(&PotatoesPicked, RecordOptions::new()).await.unwrap();
    // Only cumulative writes take the lock
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_timeout_is_reported() {
    let provider = Arc::new(LocalLockProvider::new());
    let engine = Engine::builder()
        .lock_provider(provider.clone())
        .lock_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let held = provider
        .acquire(CUMULATIVE_LOCK_KEY, &LockOptions::default())
        .await
        .unwrap();
    let err = engine.record(&TotalPotatoes, RecordOptions::new()).await.unwrap_err();
    assert_eq!(err.code(), "LockTimeout");

    // Evented writes never wait for the lock
    engine.record(&PotatoesPicked, RecordOptions::new()).await.unwrap();

    drop(held);
    engine.record(&TotalPotatoes, RecordOptions::new()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cumulative_writes_are_serialized() {
    let (engine, _clock) = engine_at(utc(2019, 10, 20, 12, 0));
    let engine = Arc::new(engine);
    let total = arc(TotalPotatoes);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        let total = total.clone();
        handles.push(tokio::spawn(async move {
            engine.record(total.as_ref(), RecordOptions::new()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let latest = engine.latest(total.as_ref(), &LatestOptions::new()).await.unwrap();
    assert_eq!(latest, 10.0);
}

#[tokio::test]
async fn test_engine_from_config() {
    let config = RollupConfig::from_toml(
        r#"
        [lock]
        timeout_secs = 1

        [[types]]
        id = 30
        name = "total_potatoes_sold"
        kind = "cumulative"

        [[types.associations]]
        slot = 1
        name = "currency"
        values = { gbp = 1, eur = 2 }

        [[types]]
        id = 50
        name = "potatoes_picked_as_integer"
        transform = "integer"
        "#,
    )
    .unwrap();

    let engine = Engine::from_config(&config, None).unwrap();
    engine.init().await.unwrap();
    assert_eq!(engine.registry().len(), 2);

    let sold = engine.metric_type(30).unwrap();
    assert!(sold.cumulative());
    engine
        .record(sold.as_ref(), RecordOptions::new().amount(3.0).association("currency", "eur"))
        .await
        .unwrap();
    let metric = engine
        .record(sold.as_ref(), RecordOptions::new().amount(4.0).association("currency", "eur"))
        .await
        .unwrap();
    assert_eq!(metric.amount, 7.0);
    assert_eq!(metric.association(1), Some(2));

    let picked = engine.registry().find_by_name("potatoes_picked_as_integer").unwrap();
    engine
        .record(picked.as_ref(), RecordOptions::new().amount(2.5))
        .await
        .unwrap();
    let set = engine
        .gather(&picked, Group::Day, GatherOptions::new())
        .await
        .unwrap()
        .into_set()
        .unwrap();
    assert!(set.points()[0].sum.is_integer());

    let err = engine.metric_type(99).err().unwrap();
    assert_eq!(err.code(), "InvalidMetricType");
}

#[tokio::test]
async fn test_engine_from_config_without_external_provider() {
    let config = RollupConfig::from_toml("[lock]\nprovider = \"external\"").unwrap();
    let err = Engine::from_config(&config, None).err().unwrap();
    assert_eq!(err.code(), "ConfigurationMissing");

    let provider: Arc<dyn LockProvider> = Arc::new(LocalLockProvider::new());
    Engine::from_config(&config, Some(provider)).unwrap();
}

#[tokio::test]
async fn test_engine_from_config_with_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rollup.db");
    let toml = format!("[storage]\nconnection = {:?}", path.to_str().unwrap());
    let config = RollupConfig::from_toml(&toml).unwrap();

    {
        let engine = Engine::from_config(&config, None).unwrap();
        engine.record(&PotatoesPicked, RecordOptions::new().amount(6.0)).await.unwrap();
    }

    let engine = Engine::from_config(&config, None).unwrap();
    let latest = engine.latest(&PotatoesPicked, &LatestOptions::new()).await.unwrap();
    assert_eq!(latest, 6.0);
}

#[tokio::test]
async fn test_registry_rejects_invalid_types() {
    let err = Engine::builder().register(arc(MetricWithoutId)).err().unwrap();
    assert_eq!(err.code(), "MetricTypeMissingID");

    let err = Engine::builder()
        .register(arc(PotatoesPicked))
        .unwrap()
        .register(arc(PotatoesPicked))
        .err()
        .unwrap();
    assert_eq!(err.code(), "InvalidMetricType");
}

#[tokio::test]
async fn test_purge() {
    let engine = engine();
    engine.record(&PotatoesPicked, RecordOptions::new()).await.unwrap();
    engine.record(&PotatoesPicked, RecordOptions::new()).await.unwrap();
    engine.record(&TotalPotatoes, RecordOptions::new()).await.unwrap();

    assert_eq!(engine.purge(Some(20)).await.unwrap(), 2);
    assert_eq!(engine.latest(&TotalPotatoes, &LatestOptions::new()).await.unwrap(), 1.0);
    assert_eq!(engine.purge(None).await.unwrap(), 1);
    assert_eq!(engine.latest(&TotalPotatoes, &LatestOptions::new()).await.unwrap(), 0.0);

    // Cumulative totals restart after a reset
    let metric = engine.record(&TotalPotatoes, RecordOptions::new()).await.unwrap();
    assert_eq!(metric.amount, 1.0);
}
