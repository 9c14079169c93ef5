//! Core data types for the resident-model cache.

use chrono::{DateTime, Utc};
use molopt_abstraction::Potential;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::freshness::FreshnessRecord;
use crate::registry::ModelId;

/// Shared reference to a resident, device-placed model instance.
pub type ModelHandle = Arc<dyn Potential>;

/// A resident model with its recency bookkeeping.
#[derive(Clone)]
pub struct ResidentEntry {
    /// The resident model instance.
    pub handle: ModelHandle,
    /// Logical timestamp of the last load, hit or release. Strictly increasing
    /// across the cache, so no two entries share a value.
    pub last_used_tick: u64,
    /// Wall-clock time of the last use.
    pub last_used_at: DateTime<Utc>,
    /// When the model was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Number of acquisitions served, including the initial load.
    pub access_count: u64,
}

impl ResidentEntry {
    /// Creates an entry for a freshly loaded model.
    #[must_use]
    pub fn new(handle: ModelHandle, tick: u64) -> Self {
        let now = Utc::now();
        Self {
            handle,
            last_used_tick: tick,
            last_used_at: now,
            loaded_at: now,
            access_count: 1,
        }
    }

    /// Marks the entry as used at `tick`.
    pub fn touch(&mut self, tick: u64) {
        self.last_used_tick = tick;
        self.last_used_at = Utc::now();
    }
}

impl fmt::Debug for ResidentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResidentEntry")
            .field("model_id", &self.handle.model_id())
            .field("last_used_tick", &self.last_used_tick)
            .field("last_used_at", &self.last_used_at)
            .field("loaded_at", &self.loaded_at)
            .field("access_count", &self.access_count)
            .finish()
    }
}

/// Finds the least-recently-used resident model.
///
/// # Returns
/// The id with the smallest `last_used_tick`, or `None` if nothing is resident.
#[must_use]
pub fn find_lru(resident: &HashMap<ModelId, ResidentEntry>) -> Option<ModelId> {
    resident
        .iter()
        .min_by_key(|(id, entry)| (entry.last_used_tick, **id))
        .map(|(id, _)| *id)
}

/// Why a resident model was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Memory usage exceeded the configured threshold before a load.
    Pressure,
    /// All slots were occupied before a load.
    Capacity,
    /// An operator or caller asked for the eviction.
    Manual,
    /// The cache is shutting down.
    Shutdown,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Pressure => "pressure",
            Self::Capacity => "capacity",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Acquisitions served from a resident model.
    pub hits: u64,
    /// Acquisitions that required a load.
    pub misses: u64,
    /// Successful loads.
    pub loads: u64,
    /// Loads that failed in the registry loader.
    pub load_failures: u64,
    /// Evictions triggered by memory pressure.
    pub pressure_evictions: u64,
    /// Evictions triggered by the slot limit.
    pub capacity_evictions: u64,
    /// Evictions requested explicitly, including shutdown.
    pub manual_evictions: u64,
    /// Models currently resident.
    pub resident: usize,
}

impl CacheStats {
    /// Hit rate in `[0, 1]`, or `0.0` before any acquisition.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    /// Total evictions for any reason.
    #[must_use]
    pub fn total_evictions(&self) -> u64 {
        self.pressure_evictions + self.capacity_evictions + self.manual_evictions
    }

    pub(crate) fn record_eviction(&mut self, reason: EvictionReason) {
        match reason {
            EvictionReason::Pressure => self.pressure_evictions += 1,
            EvictionReason::Capacity => self.capacity_evictions += 1,
            EvictionReason::Manual | EvictionReason::Shutdown => self.manual_evictions += 1,
        }
    }
}

/// Status of one registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Whether the model is registered and can be loaded.
    pub available: bool,
    /// Whether the model is resident in this process.
    pub resident: bool,
    /// Last use in this process, if resident.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Acquisitions served since the model was loaded.
    pub access_count: u64,
    /// Advisory record from the freshness store, if any.
    pub freshness: Option<FreshnessRecord>,
}

/// Device reading and configured limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    /// Device models are placed on.
    pub device: String,
    /// Whether a monitored accelerator is present.
    pub accelerator_available: bool,
    /// Current memory usage fraction.
    pub memory_usage: f64,
    /// Configured pressure threshold.
    pub memory_threshold: f64,
    /// Models currently resident.
    pub models_loaded: usize,
    /// Configured slot limit.
    pub max_models: usize,
}

/// Read-only view of the cache returned by `list_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Per-model status for every registered model.
    pub models: BTreeMap<ModelId, ModelStatus>,
    /// Device reading and limits.
    pub device: DeviceStats,
}

impl StatusSnapshot {
    /// Status of a single model.
    #[must_use]
    pub fn model(&self, id: ModelId) -> Option<&ModelStatus> {
        self.models.get(&id)
    }

    /// Ids of resident models.
    #[must_use]
    pub fn resident_ids(&self) -> Vec<ModelId> {
        self.models.iter().filter(|(_, status)| status.resident).map(|(id, _)| *id).collect()
    }
}
