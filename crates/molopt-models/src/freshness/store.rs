//! Access protocol for the external freshness store.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use super::types::{FreshnessError, FreshnessRecord};

/// Key/value store with per-key time-to-live.
///
/// Implementations talk to a service that may be down; every method reports
/// failure through `FreshnessError` instead of panicking.
#[async_trait]
pub trait FreshnessStore: Send + Sync + fmt::Debug {
    /// Writes `record` under `key`, replacing any previous value, expiring
    /// after `ttl`.
    async fn publish(
        &self,
        key: &str,
        record: &FreshnessRecord,
        ttl: Duration,
    ) -> Result<(), FreshnessError>;

    /// Resets the TTL of an existing key. Returns `false` if the key is absent
    /// or already expired.
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<bool, FreshnessError>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), FreshnessError>;

    /// Reads the record under `key`, if present and unexpired.
    async fn read(&self, key: &str) -> Result<Option<FreshnessRecord>, FreshnessError>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<(), FreshnessError>;
}
