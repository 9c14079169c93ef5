//! ModelCache implementation with pressure and capacity eviction.

use chrono::Utc;
use molopt_abstraction::Device;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::error::CacheError;
use super::lease::ModelLease;
use super::types::{
    CacheStats, DeviceStats, EvictionReason, ModelHandle, ModelStatus, ResidentEntry,
    StatusSnapshot, find_lru,
};
use crate::freshness::{FreshnessError, FreshnessRecord, FreshnessStore, freshness_key};
use crate::gauge::ResourceGauge;
use crate::registry::{ModelId, ModelLoader, ModelRegistry};

/// Bounded cache of device-resident models.
///
/// Construct one per process and share it behind an `Arc`; all operations
/// take `&self`.
#[derive(Debug)]
pub struct ModelCache {
    /// Cache configuration.
    config: CacheConfig,
    /// Device new models are placed on.
    device: Device,
    registry: Arc<ModelRegistry>,
    gauge: Arc<dyn ResourceGauge>,
    store: Arc<dyn FreshnessStore>,
    /// Held for the whole of every load, hit and eviction. Store calls never
    /// run while it is held.
    transition: Mutex<()>,
    /// Resident models. Entries are only inserted or removed while
    /// `transition` is held; `release` may update recency without it.
    resident: RwLock<HashMap<ModelId, ResidentEntry>>,
    /// Logical clock stamped on every use.
    clock: AtomicU64,
    stats: RwLock<CacheStats>,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Models are placed on the configured device when the gauge reports an
    /// accelerator, and on the CPU otherwise.
    ///
    /// # Arguments
    /// * `config` - Cache configuration
    /// * `registry` - Models that may be loaded
    /// * `gauge` - Memory usage source consulted before every load
    /// * `store` - Advisory freshness store
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(
        config: CacheConfig,
        registry: Arc<ModelRegistry>,
        gauge: Arc<dyn ResourceGauge>,
        store: Arc<dyn FreshnessStore>,
    ) -> Result<Self, CacheConfigError> {
        config.validate()?;

        let configured = config.parsed_device()?;
        let device = if gauge.accelerator_available() { configured } else { Device::Cpu };
        info!(
            device = %device,
            max_loaded = config.max_loaded,
            memory_threshold = config.memory_threshold,
            "Model cache initialized"
        );

        Ok(Self {
            config,
            device,
            registry,
            gauge,
            store,
            transition: Mutex::new(()),
            resident: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Device new models are placed on.
    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    /// The registry this cache loads from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Returns a handle to `id`, loading it if it is not resident.
    ///
    /// A hit refreshes the model's recency and its freshness TTL. A miss runs
    /// the full load sequence, evicting under memory pressure and then under
    /// the slot limit before calling the loader. Freshness-store calls run
    /// after the exclusive section is released.
    ///
    /// # Errors
    /// * `CacheError::UnknownModel` if `id` is not registered. State is untouched.
    /// * `CacheError::LoadFailure` if the loader fails. No slot is occupied.
    pub async fn acquire(&self, id: ModelId) -> Result<ModelHandle, CacheError> {
        let Some(entry) = self.registry.get(id) else {
            return Err(CacheError::UnknownModel(id.to_string()));
        };
        let loader = Arc::clone(&entry.loader);

        let mut writes = Vec::new();
        let result = self.acquire_exclusive(id, &loader, &mut writes).await;
        self.flush(writes).await;
        result
    }

    async fn acquire_exclusive(
        &self,
        id: ModelId,
        loader: &Arc<dyn ModelLoader>,
        writes: &mut Vec<StoreWrite>,
    ) -> Result<ModelHandle, CacheError> {
        let _transition = self.transition.lock().await;

        if let Some(handle) = self.touch_resident(id) {
            self.stats_write().hits += 1;
            debug!(model = %id, "Cache hit");
            self.spawn_refresh(id);
            return Ok(handle);
        }

        self.stats_write().misses += 1;
        debug!(model = %id, "Cache miss, loading model");

        while self.gauge.current_usage() > self.config.memory_threshold {
            let Some(victim) = find_lru(&self.resident_read()) else {
                break;
            };
            self.remove_resident(victim, EvictionReason::Pressure, writes);
        }

        while self.resident_read().len() >= self.config.max_loaded {
            let Some(victim) = find_lru(&self.resident_read()) else {
                break;
            };
            self.remove_resident(victim, EvictionReason::Capacity, writes);
        }

        let handle = match loader.load(id, &self.device).await {
            Ok(handle) => handle,
            Err(source) => {
                self.stats_write().load_failures += 1;
                error!(model = %id, device = %self.device, error = %source, "Model load failed");
                return Err(CacheError::LoadFailure { model: id, source });
            }
        };

        let tick = self.next_tick();
        self.resident_write().insert(id, ResidentEntry::new(Arc::clone(&handle), tick));
        self.stats_write().loads += 1;

        let memory_usage = self.gauge.current_usage();
        info!(model = %id, device = %self.device, memory_usage, "Model loaded");

        writes.push(StoreWrite::Publish { id, record: FreshnessRecord::new(self.device, memory_usage) });
        Ok(handle)
    }

    /// Resolves a free-form model name and acquires it.
    ///
    /// # Errors
    /// * `CacheError::UnknownModel` if the name does not resolve to a
    ///   registered model. State is untouched.
    /// * `CacheError::LoadFailure` if the loader fails.
    pub async fn acquire_by_name(&self, name: &str) -> Result<ModelHandle, CacheError> {
        let id = self.registry.resolve(name)?;
        self.acquire(id).await
    }

    /// Acquires `id` for the lifetime of the returned lease.
    ///
    /// # Errors
    /// Same as [`ModelCache::acquire`].
    pub async fn lease(&self, id: ModelId) -> Result<ModelLease<'_>, CacheError> {
        let handle = self.acquire(id).await?;
        Ok(ModelLease::new(self, id, handle))
    }

    /// Marks `id` as just used. Does not unload.
    ///
    /// No-op if the model is no longer resident.
    pub fn release(&self, id: ModelId) {
        let tick = self.next_tick();
        if let Some(entry) = self.resident_write().get_mut(&id) {
            entry.touch(tick);
            debug!(model = %id, "Model released");
        }
    }

    /// Forcibly removes `id`, freeing its device resources and deleting its
    /// freshness record.
    ///
    /// # Returns
    /// `true` if the model was resident.
    pub async fn evict(&self, id: ModelId) -> bool {
        let mut writes = Vec::new();
        {
            let _transition = self.transition.lock().await;
            if !self.resident_read().contains_key(&id) {
                return false;
            }
            self.remove_resident(id, EvictionReason::Manual, &mut writes);
        }
        self.flush(writes).await;
        true
    }

    /// Loads every id in `ids`, logging failures instead of returning them.
    ///
    /// # Returns
    /// Number of models that are resident after their load.
    pub async fn preload(&self, ids: &[ModelId]) -> usize {
        let mut loaded = 0;
        for &id in ids {
            match self.acquire(id).await {
                Ok(_) => {
                    self.release(id);
                    loaded += 1;
                }
                Err(e) => warn!(model = %id, error = %e, "Failed to preload model"),
            }
        }
        info!(requested = ids.len(), loaded, "Preload complete");
        loaded
    }

    /// Evicts every resident model.
    pub async fn shutdown(&self) {
        let mut writes = Vec::new();
        {
            let _transition = self.transition.lock().await;
            let mut ids: Vec<ModelId> = self.resident_read().keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                self.remove_resident(id, EvictionReason::Shutdown, &mut writes);
            }
        }
        info!(unloaded = writes.len(), "Model cache shut down");
        self.flush(writes).await;
    }

    /// Status of every registered model plus the current device reading.
    ///
    /// Never mutates cache state.
    pub async fn list_status(&self) -> StatusSnapshot {
        let resident: HashMap<ModelId, (chrono::DateTime<Utc>, u64)> = self
            .resident_read()
            .iter()
            .map(|(id, entry)| (*id, (entry.last_used_at, entry.access_count)))
            .collect();

        let mut models = BTreeMap::new();
        for id in self.registry.ids() {
            let freshness =
                self.advisory("read", id, self.store.read(&freshness_key(id))).await.flatten();
            let usage = resident.get(&id);
            models.insert(
                id,
                ModelStatus {
                    available: true,
                    resident: usage.is_some(),
                    last_used_at: usage.map(|(at, _)| *at),
                    access_count: usage.map_or(0, |(_, count)| *count),
                    freshness,
                },
            );
        }

        let device = DeviceStats {
            device: self.device.to_string(),
            accelerator_available: self.gauge.accelerator_available(),
            memory_usage: self.gauge.current_usage(),
            memory_threshold: self.config.memory_threshold,
            models_loaded: resident.len(),
            max_models: self.config.max_loaded,
        };

        StatusSnapshot { models, device }
    }

    /// Ids of resident models, least recently used first.
    #[must_use]
    pub fn resident_models(&self) -> Vec<ModelId> {
        let resident = self.resident_read();
        let mut entries: Vec<(u64, ModelId)> =
            resident.iter().map(|(id, entry)| (entry.last_used_tick, *id)).collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Whether `id` is resident.
    #[must_use]
    pub fn is_resident(&self, id: ModelId) -> bool {
        self.resident_read().contains_key(&id)
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut result = self.stats.read().unwrap_or_else(PoisonError::into_inner).clone();
        result.resident = self.resident_read().len();
        result
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn touch_resident(&self, id: ModelId) -> Option<ModelHandle> {
        let tick = self.next_tick();
        let mut resident = self.resident_write();
        let entry = resident.get_mut(&id)?;
        entry.touch(tick);
        entry.access_count += 1;
        Some(Arc::clone(&entry.handle))
    }

    /// Removes a resident entry and queues the deletion of its freshness
    /// record. Caller must hold `transition`.
    fn remove_resident(&self, id: ModelId, reason: EvictionReason, writes: &mut Vec<StoreWrite>) {
        let Some(entry) = self.resident_write().remove(&id) else {
            return;
        };

        if let Err(e) = entry.handle.unload() {
            warn!(model = %id, error = %e, "Failed to release device memory, dropping entry anyway");
        }
        self.stats_write().record_eviction(reason);
        info!(model = %id, reason = %reason, "Evicted model");

        writes.push(StoreWrite::Delete(id));
    }

    /// Applies queued store writes in order. Must not be called while
    /// `transition` is held.
    async fn flush(&self, writes: Vec<StoreWrite>) {
        let ttl = self.config.freshness_ttl();
        for write in writes {
            match write {
                StoreWrite::Publish { id, record } => {
                    let key = freshness_key(id);
                    self.advisory("publish", id, self.store.publish(&key, &record, ttl)).await;
                }
                StoreWrite::Delete(id) => {
                    self.advisory("delete", id, self.store.delete(&freshness_key(id))).await;
                }
            }
        }
    }

    /// Extends the freshness TTL of `id` on a detached task.
    fn spawn_refresh(&self, id: ModelId) {
        let store = Arc::clone(&self.store);
        let ttl = self.config.freshness_ttl();
        let limit = self.config.freshness_timeout();
        tokio::spawn(async move {
            let key = freshness_key(id);
            if bounded(limit, "refresh", id, store.refresh(&key, ttl)).await == Some(false) {
                debug!(model = %id, "Freshness record had expired");
            }
        });
    }

    /// Runs a freshness-store call bounded by the configured timeout.
    async fn advisory<T>(
        &self,
        operation: &'static str,
        id: ModelId,
        call: impl Future<Output = Result<T, FreshnessError>>,
    ) -> Option<T> {
        bounded(self.config.freshness_timeout(), operation, id, call).await
    }

    fn resident_read(&self) -> RwLockReadGuard<'_, HashMap<ModelId, ResidentEntry>> {
        self.resident.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn resident_write(&self) -> RwLockWriteGuard<'_, HashMap<ModelId, ResidentEntry>> {
        self.resident.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_write(&self) -> RwLockWriteGuard<'_, CacheStats> {
        self.stats.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Store write queued inside the exclusive section.
enum StoreWrite {
    Publish { id: ModelId, record: FreshnessRecord },
    Delete(ModelId),
}

/// Awaits `call` for at most `limit`.
///
/// # Returns
/// The call's value, or `None` if it failed or timed out. Failures are
/// logged and swallowed.
async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    id: ModelId,
    call: impl Future<Output = Result<T, FreshnessError>>,
) -> Option<T> {
    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(FreshnessError::Timeout { operation }),
    };
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(model = %id, operation, error = %e, "Freshness store call failed");
            None
        }
    }
}
