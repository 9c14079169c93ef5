//! Redis-backed freshness store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::store::FreshnessStore;
use super::types::{FreshnessError, FreshnessRecord};

fn unavailable(error: &redis::RedisError) -> FreshnessError {
    FreshnessError::Unavailable { message: error.to_string() }
}

/// Freshness store backed by a shared Redis instance.
///
/// The connection is established lazily on first use and reconnects
/// automatically, so constructing the store never fails because Redis is down.
pub struct RedisFreshnessStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisFreshnessStore {
    /// Creates a store for `url` (e.g. `redis://localhost:6379/0`).
    ///
    /// # Errors
    /// Returns `FreshnessError::Unavailable` if the URL is malformed.
    pub fn open(url: &str) -> Result<Self, FreshnessError> {
        let client = redis::Client::open(url).map_err(|e| unavailable(&e))?;
        Ok(Self { client, connection: OnceCell::new() })
    }

    async fn connection(&self) -> Result<ConnectionManager, FreshnessError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting to Redis freshness store");
                ConnectionManager::new(self.client.clone()).await.map_err(|e| unavailable(&e))
            })
            .await?;
        Ok(connection.clone())
    }
}

impl fmt::Debug for RedisFreshnessStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisFreshnessStore")
            .field("connected", &self.connection.initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FreshnessStore for RedisFreshnessStore {
    async fn publish(
        &self,
        key: &str,
        record: &FreshnessRecord,
        ttl: Duration,
    ) -> Result<(), FreshnessError> {
        let payload = record.to_json()?;
        let mut connection = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(())
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<bool, FreshnessError> {
        let mut connection = self.connection().await?;
        let updated: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(updated == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), FreshnessError> {
        let mut connection = self.connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<FreshnessRecord>, FreshnessError> {
        let mut connection = self.connection().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|e| unavailable(&e))?;
        payload.as_deref().map(FreshnessRecord::from_json).transpose()
    }

    async fn ping(&self) -> Result<(), FreshnessError> {
        let mut connection = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| unavailable(&e))?;
        Ok(())
    }
}
