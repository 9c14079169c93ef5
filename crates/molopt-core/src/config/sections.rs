//! Configuration sections other than the cache.

use molopt_models::{DEFAULT_PREFERENCE, ModelId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::jobs::RetryPolicy;

/// Model preload and selection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsSection {
    /// Models loaded at startup.
    #[serde(default)]
    pub preload: Vec<ModelId>,
    /// Selector preference order, most preferred first.
    #[serde(default = "default_preference")]
    pub preference: Vec<ModelId>,
}

fn default_preference() -> Vec<ModelId> {
    DEFAULT_PREFERENCE.to_vec()
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self { preload: Vec::new(), preference: default_preference() }
    }
}

impl ModelsSection {
    /// Validate the section.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the preference order is empty.
    pub fn validate(&self) -> Result<()> {
        if self.preference.is_empty() {
            return Err(CoreError::Config("models.preference must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Which freshness store backs the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessBackend {
    /// Process-local store.
    #[default]
    Memory,
    /// Shared Redis instance.
    Redis,
}

/// Freshness store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessSection {
    /// Store backend.
    #[serde(default)]
    pub backend: FreshnessBackend,
    /// Redis URL, used by the `redis` backend.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

impl Default for FreshnessSection {
    fn default() -> Self {
        Self { backend: FreshnessBackend::default(), url: default_redis_url() }
    }
}

/// Which memory gauge the cache consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeBackend {
    /// Use sysfs counters when present, otherwise report no accelerator.
    #[default]
    Auto,
    /// Always report no accelerator.
    None,
    /// Always read sysfs counters.
    Sysfs,
}

/// Memory gauge configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSection {
    /// Gauge backend.
    #[serde(default)]
    pub backend: GaugeBackend,
    /// DRM card index.
    #[serde(default)]
    pub card: u32,
}

/// Request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Largest structure accepted, in atoms (default: 500).
    #[serde(default = "default_max_atoms")]
    pub max_atoms: usize,
    /// Largest batch accepted (default: 32).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_atoms() -> usize {
    500
}

fn default_max_batch_size() -> usize {
    32
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self { max_atoms: default_max_atoms(), max_batch_size: default_max_batch_size() }
    }
}

impl LimitsSection {
    /// Validate the section.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if either limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_atoms == 0 || self.max_batch_size == 0 {
            return Err(CoreError::Config(
                "limits.max_atoms and limits.max_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsSection {
    /// Jobs running at once (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries after the first attempt for system faults (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds (default: 1000).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Longest delay between retries, in milliseconds (default: 8000).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Limit on a single attempt, in seconds (default: 600).
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u64,
    /// How long a finished job stays queryable, in seconds (default: 3600).
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_time_limit_secs() -> u64 {
    600
}

fn default_result_ttl_secs() -> u64 {
    3600
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            time_limit_secs: default_time_limit_secs(),
            result_ttl_secs: default_result_ttl_secs(),
        }
    }
}

impl JobsSection {
    /// Validate the section.
    ///
    /// # Errors
    /// Returns `CoreError::Config` on zero workers, time limit or result TTL,
    /// or a maximum backoff below the initial one.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CoreError::Config("jobs.workers must be greater than 0".to_string()));
        }
        if self.time_limit_secs == 0 {
            return Err(CoreError::Config(
                "jobs.time_limit_secs must be greater than 0".to_string(),
            ));
        }
        if self.result_ttl_secs == 0 {
            return Err(CoreError::Config(
                "jobs.result_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(CoreError::Config(
                "jobs.max_backoff_ms must not be below jobs.initial_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy described by this section.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            2.0,
        )
    }

    /// Limit on a single attempt.
    #[must_use]
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// How long a finished job stays queryable.
    #[must_use]
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}
