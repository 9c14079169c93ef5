//! Integration tests for the resident-model cache.

use async_trait::async_trait;
use molopt_models::{
    CacheConfig, CacheError, FixedGauge, FreshnessError, FreshnessRecord, FreshnessStore,
    InMemoryFreshnessStore, MockLoader, ModelCache, ModelId, ModelLoader, ModelRegistry,
    ResourceGauge, freshness_key,
};
use std::sync::Arc;
use std::time::Duration;

/// Store whose every call fails, as if the network were down.
#[derive(Debug)]
struct UnreachableStore;

#[async_trait]
impl FreshnessStore for UnreachableStore {
    async fn publish(&self, _: &str, _: &FreshnessRecord, _: Duration) -> Result<(), FreshnessError> {
        Err(FreshnessError::Unavailable { message: "connection refused".to_string() })
    }

    async fn refresh(&self, _: &str, _: Duration) -> Result<bool, FreshnessError> {
        Err(FreshnessError::Unavailable { message: "connection refused".to_string() })
    }

    async fn delete(&self, _: &str) -> Result<(), FreshnessError> {
        Err(FreshnessError::Unavailable { message: "connection refused".to_string() })
    }

    async fn read(&self, _: &str) -> Result<Option<FreshnessRecord>, FreshnessError> {
        Err(FreshnessError::Unavailable { message: "connection refused".to_string() })
    }

    async fn ping(&self) -> Result<(), FreshnessError> {
        Err(FreshnessError::Unavailable { message: "connection refused".to_string() })
    }
}

/// Store whose calls never complete.
#[derive(Debug)]
struct HangingStore;

#[async_trait]
impl FreshnessStore for HangingStore {
    async fn publish(&self, _: &str, _: &FreshnessRecord, _: Duration) -> Result<(), FreshnessError> {
        futures::future::pending().await
    }

    async fn refresh(&self, _: &str, _: Duration) -> Result<bool, FreshnessError> {
        futures::future::pending().await
    }

    async fn delete(&self, _: &str) -> Result<(), FreshnessError> {
        futures::future::pending().await
    }

    async fn read(&self, _: &str) -> Result<Option<FreshnessRecord>, FreshnessError> {
        futures::future::pending().await
    }

    async fn ping(&self) -> Result<(), FreshnessError> {
        futures::future::pending().await
    }
}

fn build_cache(
    max_loaded: usize,
    loader: &Arc<MockLoader>,
    gauge: &Arc<FixedGauge>,
    store: Arc<dyn FreshnessStore>,
) -> ModelCache {
    let registry = Arc::new(ModelRegistry::standard(Arc::clone(loader) as Arc<dyn ModelLoader>));
    let config = CacheConfig { max_loaded, ..CacheConfig::default() };
    ModelCache::new(config, registry, Arc::clone(gauge) as Arc<dyn ResourceGauge>, store).unwrap()
}

#[tokio::test]
async fn test_capacity_bound_holds_after_every_call() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.1));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));

    let ids = ModelId::ALL;
    for round in 0..30_usize {
        let id = ids[(round * 7 + round / 3) % ids.len()];
        match round % 5 {
            0 | 1 | 2 => {
                cache.acquire(id).await.unwrap();
            }
            3 => cache.release(id),
            _ => {
                cache.evict(id).await;
            }
        }
        assert!(cache.stats().resident <= 2, "capacity exceeded at round {round}");
    }
}

#[tokio::test]
async fn test_second_acquire_does_not_reload() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));

    cache.acquire(ModelId::Ani1ccx).await.unwrap();
    cache.release(ModelId::Ani1ccx);
    cache.acquire(ModelId::Ani1ccx).await.unwrap();

    assert_eq!(loader.loads_of(ModelId::Ani1ccx), 1);
}

#[tokio::test]
async fn test_pressure_evicts_before_loading_non_resident_model() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(3, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));

    cache.acquire(ModelId::Ani2x).await.unwrap();
    gauge.set(0.95);
    cache.acquire(ModelId::Ani1x).await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.pressure_evictions, 1);
    assert_eq!(loader.unload_count(), 1);
    assert_eq!(loader.load_count(), 2);
    assert_eq!(cache.resident_models(), vec![ModelId::Ani1x]);
}

#[tokio::test]
async fn test_pressure_below_threshold_only_capacity_applies() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.7));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));

    cache.acquire(ModelId::Ani2x).await.unwrap();
    cache.acquire(ModelId::Ani1x).await.unwrap();

    // Usage equal to the threshold is not pressure.
    assert_eq!(cache.stats().pressure_evictions, 0);
    assert_eq!(cache.stats().resident, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_acquire_loads_once() {
    let loader = Arc::new(MockLoader::new().with_delay(Duration::from_millis(50)));
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));

    let (first, second) = tokio::join!(cache.acquire(ModelId::Ani2x), cache.acquire(ModelId::Ani2x));

    let first = first.unwrap();
    let second = second.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.load_count(), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_across_tasks_loads_once() {
    let loader = Arc::new(MockLoader::new().with_delay(Duration::from_millis(20)));
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = Arc::new(build_cache(1, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new())));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let lease = cache.lease(ModelId::Ani1x).await.unwrap();
                lease.model_id().to_string()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), "ANI1x");
    }
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn test_unknown_model_does_not_mutate_state() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));
    cache.acquire(ModelId::Ani2x).await.unwrap();
    let before = cache.resident_models();

    let err = cache.acquire_by_name("unregistered").await.err().unwrap();

    assert!(matches!(err, CacheError::UnknownModel(name) if name == "unregistered"));
    assert_eq!(cache.resident_models(), before);
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn test_failing_loader_leaves_resident_set_unchanged() {
    let loader = Arc::new(MockLoader::new().failing(ModelId::Ani1ccx));
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(2, &loader, &gauge, Arc::new(InMemoryFreshnessStore::new()));
    cache.acquire(ModelId::Ani2x).await.unwrap();

    let result = cache.acquire(ModelId::Ani1ccx).await;

    assert!(matches!(result, Err(CacheError::LoadFailure { model: ModelId::Ani1ccx, .. })));
    assert_eq!(cache.resident_models(), vec![ModelId::Ani2x]);
    assert!(!cache.is_resident(ModelId::Ani1ccx));
}

#[tokio::test]
async fn test_unreachable_store_does_not_change_outcomes() {
    let loader = Arc::new(MockLoader::new().failing(ModelId::Ani1ccx));
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(1, &loader, &gauge, Arc::new(UnreachableStore));

    let handle = cache.acquire(ModelId::Ani2x).await.unwrap();
    assert_eq!(handle.model_id(), "ANI2x");
    cache.release(ModelId::Ani2x);
    assert!(cache.acquire(ModelId::Ani2x).await.is_ok());
    assert!(cache.acquire(ModelId::Ani1x).await.is_ok());
    assert!(cache.evict(ModelId::Ani1x).await);
    assert!(!cache.evict(ModelId::Ani1x).await);
    assert!(matches!(cache.acquire(ModelId::Ani1ccx).await, Err(CacheError::LoadFailure { .. })));
    assert_eq!(cache.stats().resident, 0);

    let snapshot = cache.list_status().await;
    assert!(snapshot.models.values().all(|status| status.freshness.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_store_is_bounded_by_timeout() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = build_cache(2, &loader, &gauge, Arc::new(HangingStore));

    let handle = cache.acquire(ModelId::Ani2x).await.unwrap();
    assert_eq!(handle.model_id(), "ANI2x");
    assert!(cache.acquire(ModelId::Ani2x).await.is_ok());
    assert!(cache.evict(ModelId::Ani2x).await);
}

#[tokio::test]
async fn test_freshness_is_shared_between_caches() {
    let store = InMemoryFreshnessStore::new();
    let gauge = Arc::new(FixedGauge::new(0.3));
    let worker_loader = Arc::new(MockLoader::new());
    let observer_loader = Arc::new(MockLoader::new());
    let worker = build_cache(2, &worker_loader, &gauge, Arc::new(store.clone()));
    let observer = build_cache(2, &observer_loader, &gauge, Arc::new(store.clone()));

    worker.acquire(ModelId::Ani2x).await.unwrap();

    let snapshot = observer.list_status().await;
    let status = snapshot.model(ModelId::Ani2x).unwrap();
    assert!(!status.resident);
    let record = status.freshness.as_ref().unwrap();
    assert!((record.memory_usage - 0.3).abs() < f64::EPSILON);
    assert_eq!(observer_loader.load_count(), 0);

    worker.evict(ModelId::Ani2x).await;
    assert!(store.read(&freshness_key(ModelId::Ani2x)).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_hits_do_not_wait_on_hanging_store() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = Arc::new(build_cache(2, &loader, &gauge, Arc::new(HangingStore)));
    cache.acquire(ModelId::Ani2x).await.unwrap();

    let started = tokio::time::Instant::now();
    let hits: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.acquire(ModelId::Ani2x).await.is_ok() })
        })
        .collect();
    for hit in hits {
        assert!(hit.await.unwrap());
    }

    assert!(started.elapsed() < CacheConfig::default().freshness_timeout());
    assert_eq!(cache.stats().hits, 4);
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hit_does_not_wait_on_pending_eviction_delete() {
    let loader = Arc::new(MockLoader::new());
    let gauge = Arc::new(FixedGauge::new(0.0));
    let cache = Arc::new(build_cache(2, &loader, &gauge, Arc::new(HangingStore)));
    cache.acquire(ModelId::Ani2x).await.unwrap();
    cache.acquire(ModelId::Ani1x).await.unwrap();

    let evicting = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.evict(ModelId::Ani1x).await })
    };
    // The eviction takes the exclusive section and parks on its store delete.
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    cache.acquire(ModelId::Ani2x).await.unwrap();
    assert!(started.elapsed() < CacheConfig::default().freshness_timeout());

    assert!(evicting.await.unwrap());
    assert_eq!(cache.resident_models(), vec![ModelId::Ani2x]);
}
