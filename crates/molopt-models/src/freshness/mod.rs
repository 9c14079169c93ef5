//! Advisory "model is warm" metadata shared across processes.
//!
//! When the cache loads a model it publishes a [`FreshnessRecord`] with a
//! time-to-live to an external key/value store; hits extend the TTL and
//! evictions delete the record. Other processes read these records to see
//! which models were used recently without loading anything.
//!
//! # Consistency
//!
//! Records are advisory. The cache's own resident set is authoritative for
//! what is loaded in this process, and the cache keeps serving when the store
//! is unreachable: store errors are logged and swallowed at every call site.
//! TTL expiry is the backstop for deletes that never reached the store.
//!
//! # Backends
//!
//! - [`InMemoryFreshnessStore`]: process-local, used for single-process
//!   deployments and tests.
//! - `RedisFreshnessStore` (feature `redis-store`): `SET EX` / `EXPIRE` /
//!   `DEL` / `GET` against a shared Redis instance.

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;
mod store;
mod types;

pub use memory::InMemoryFreshnessStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisFreshnessStore;
pub use store::FreshnessStore;
pub use types::{FreshnessError, FreshnessRecord, freshness_key};
