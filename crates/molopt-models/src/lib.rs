//! Resident-model management for molopt.
//!
//! This crate decides which computational models are loaded on the
//! accelerator at any moment.
//!
//! # Components
//!
//! - [`registry`]: the closed set of model identifiers, their supported
//!   elements and loaders
//! - [`selector`]: picks a model for a required element set
//! - [`gauge`]: accelerator memory readings
//! - [`freshness`]: advisory "model is warm" records shared across processes
//! - [`cache`]: the bounded cache that loads, evicts and lends out models
//! - [`mock`]: deterministic reference collaborators

pub mod cache;
pub mod freshness;
pub mod gauge;
pub mod mock;
pub mod registry;
pub mod selector;

pub use cache::{
    CacheConfig, CacheConfigError, CacheError, CacheStats, DeviceStats, EvictionReason,
    ModelCache, ModelHandle, ModelLease, ModelStatus, StatusSnapshot,
};
#[cfg(feature = "redis-store")]
pub use freshness::RedisFreshnessStore;
pub use freshness::{
    FreshnessError, FreshnessRecord, FreshnessStore, InMemoryFreshnessStore, freshness_key,
};
pub use gauge::{FixedGauge, NoAcceleratorGauge, ResourceGauge, SysfsVramGauge, detect_gauge};
pub use mock::{ChainEmbedder, MockLoader, MockPotential, SteepestDescentOptimizer};
pub use registry::{FnLoader, ModelId, ModelLoader, ModelRegistry, UnknownModelId};
pub use selector::{DEFAULT_PREFERENCE, ModelSelector};
