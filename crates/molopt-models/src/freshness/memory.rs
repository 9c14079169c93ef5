//! Process-local freshness store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use super::store::FreshnessStore;
use super::types::{FreshnessError, FreshnessRecord};

#[derive(Debug, Clone)]
struct StoredRecord {
    record: FreshnessRecord,
    expires_at: Instant,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe in-memory store with TTL enforced on access.
///
/// Cloning shares the underlying map, so several caches in one process see
/// the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFreshnessStore {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
}

impl InMemoryFreshnessStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired records.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.values().filter(|stored| !stored.is_expired(now)).count()
    }

    /// Whether no unexpired records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of `key`, if present and unexpired.
    #[must_use]
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.expires_at - now)
    }

    /// Drops expired records.
    ///
    /// # Returns
    /// Number of records removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let initial_count = records.len();
        records.retain(|_, stored| !stored.is_expired(now));
        initial_count - records.len()
    }
}

#[async_trait]
impl FreshnessStore for InMemoryFreshnessStore {
    async fn publish(
        &self,
        key: &str,
        record: &FreshnessRecord,
        ttl: Duration,
    ) -> Result<(), FreshnessError> {
        let stored = StoredRecord { record: record.clone(), expires_at: Instant::now() + ttl };
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(key.to_string(), stored);
        Ok(())
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<bool, FreshnessError> {
        let now = Instant::now();
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(key) {
            Some(stored) if !stored.is_expired(now) => {
                stored.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => {
                records.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), FreshnessError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(key);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<FreshnessRecord>, FreshnessError> {
        let now = Instant::now();
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.record.clone()))
    }

    async fn ping(&self) -> Result<(), FreshnessError> {
        Ok(())
    }
}
