//! Resident-model cache with capacity and memory-pressure eviction.
//!
//! The cache owns every loaded model instance. Callers borrow a handle for one
//! operation via [`ModelCache::lease`] (or the lower-level
//! [`ModelCache::acquire`] / [`ModelCache::release`] pair). Loads and
//! evictions run one at a time under an exclusive transition lock, so two
//! callers never load the same model twice and an eviction never races a load.
//!
//! # Load sequence
//!
//! 1. While memory usage exceeds the threshold and something is resident,
//!    evict the least-recently-used model.
//! 2. While every slot is occupied, evict the least-recently-used model.
//! 3. Invoke the registry loader on the configured device.
//! 4. Record the new resident entry.
//! 5. Publish a freshness record with the configured TTL.
//!
//! Freshness-store calls are advisory: they are bounded by a timeout, and any
//! failure is logged and ignored.

mod cache;
mod config;
mod error;
mod lease;
mod types;

pub use cache::ModelCache;
pub use config::{CacheConfig, CacheConfigError};
pub use error::CacheError;
pub use lease::ModelLease;
pub use types::{
    CacheStats, DeviceStats, EvictionReason, ModelHandle, ModelStatus, ResidentEntry,
    StatusSnapshot, find_lru,
};
