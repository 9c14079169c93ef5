//! Configuration for the model cache.

use molopt_abstraction::Device;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the resident-model cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of resident models (default: 2).
    #[serde(default = "default_max_loaded")]
    pub max_loaded: usize,

    /// Memory usage fraction above which resident models are evicted before a
    /// load (default: 0.7).
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,

    /// Seconds a freshness record stays alive without a hit (default: 300).
    #[serde(default = "default_freshness_ttl_secs")]
    pub freshness_ttl_secs: u64,

    /// Upper bound on a single freshness-store round trip, in milliseconds
    /// (default: 250).
    #[serde(default = "default_freshness_timeout_ms")]
    pub freshness_timeout_ms: u64,

    /// Device models are placed on when an accelerator is present
    /// (default: `cuda:0`).
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_max_loaded() -> usize {
    2
}

fn default_memory_threshold() -> f64 {
    0.7
}

fn default_freshness_ttl_secs() -> u64 {
    300
}

fn default_freshness_timeout_ms() -> u64 {
    250
}

fn default_device() -> String {
    "cuda:0".to_string()
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheConfigError {
    /// Invalid max loaded (must be > 0).
    #[error("Invalid max loaded models: must be greater than 0")]
    InvalidMaxLoaded,

    /// Invalid memory threshold (must be within (0, 1]).
    #[error("Invalid memory threshold {0}: must be within (0, 1]")]
    InvalidMemoryThreshold(String),

    /// Invalid freshness TTL (must be > 0).
    #[error("Invalid freshness TTL: must be greater than 0")]
    InvalidFreshnessTtl,

    /// Invalid freshness timeout (must be > 0).
    #[error("Invalid freshness timeout: must be greater than 0")]
    InvalidFreshnessTimeout,

    /// Device string not understood.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_loaded: default_max_loaded(),
            memory_threshold: default_memory_threshold(),
            freshness_ttl_secs: default_freshness_ttl_secs(),
            freshness_timeout_ms: default_freshness_timeout_ms(),
            device: default_device(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.max_loaded == 0 {
            return Err(CacheConfigError::InvalidMaxLoaded);
        }

        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(CacheConfigError::InvalidMemoryThreshold(
                self.memory_threshold.to_string(),
            ));
        }

        if self.freshness_ttl_secs == 0 {
            return Err(CacheConfigError::InvalidFreshnessTtl);
        }

        if self.freshness_timeout_ms == 0 {
            return Err(CacheConfigError::InvalidFreshnessTimeout);
        }

        self.parsed_device()?;

        Ok(())
    }

    /// The configured device.
    ///
    /// # Errors
    /// Returns `CacheConfigError::InvalidDevice` if the device string does not
    /// parse.
    pub fn parsed_device(&self) -> Result<Device, CacheConfigError> {
        self.device
            .parse()
            .map_err(|_| CacheConfigError::InvalidDevice(self.device.clone()))
    }

    /// Get the freshness TTL as a Duration.
    #[must_use]
    pub fn freshness_ttl(&self) -> Duration {
        Duration::from_secs(self.freshness_ttl_secs)
    }

    /// Get the freshness store timeout as a Duration.
    #[must_use]
    pub fn freshness_timeout(&self) -> Duration {
        Duration::from_millis(self.freshness_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_loaded, 2);
        assert!((config.memory_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.freshness_ttl(), Duration::from_secs(300));
        assert_eq!(config.freshness_timeout(), Duration::from_millis(250));
        assert_eq!(config.parsed_device(), Ok(Device::Cuda(0)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_validation_invalid_max_loaded() {
        let config = CacheConfig { max_loaded: 0, ..CacheConfig::default() };
        assert_eq!(config.validate(), Err(CacheConfigError::InvalidMaxLoaded));
    }

    #[test]
    fn test_cache_config_validation_invalid_threshold() {
        for threshold in [0.0, -0.5, 1.5, f64::NAN] {
            let config = CacheConfig { memory_threshold: threshold, ..CacheConfig::default() };
            assert!(matches!(
                config.validate(),
                Err(CacheConfigError::InvalidMemoryThreshold(_))
            ));
        }

        let config = CacheConfig { memory_threshold: 1.0, ..CacheConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_validation_invalid_durations() {
        let config = CacheConfig { freshness_ttl_secs: 0, ..CacheConfig::default() };
        assert_eq!(config.validate(), Err(CacheConfigError::InvalidFreshnessTtl));

        let config = CacheConfig { freshness_timeout_ms: 0, ..CacheConfig::default() };
        assert_eq!(config.validate(), Err(CacheConfigError::InvalidFreshnessTimeout));
    }

    #[test]
    fn test_cache_config_validation_invalid_device() {
        let config = CacheConfig { device: "tpu:7".to_string(), ..CacheConfig::default() };
        assert_eq!(
            config.validate(),
            Err(CacheConfigError::InvalidDevice("tpu:7".to_string()))
        );
    }

    #[test]
    fn test_cache_config_partial_toml_uses_defaults() {
        let config: CacheConfig = toml::from_str("max_loaded = 3\ndevice = \"cpu\"").unwrap();
        assert_eq!(config.max_loaded, 3);
        assert_eq!(config.device, "cpu");
        assert_eq!(config.freshness_ttl_secs, 300);
    }
}
