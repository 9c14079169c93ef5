//! Configuration module for molopt core.
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed `MOLOPT__`, with `__` separating nested
//!    keys (e.g. `MOLOPT__CACHE__MAX_LOADED=3`)

mod sections;

use molopt_models::CacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::logging::LogFormat;

pub use sections::{
    FreshnessBackend, FreshnessSection, GaugeBackend, GaugeSection, JobsSection, LimitsSection,
    ModelsSection,
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MOLOPT";

/// Root configuration for the molopt service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name reported by status surfaces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Model cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Model preload and selection configuration.
    #[serde(default)]
    pub models: ModelsSection,
    /// Freshness store configuration.
    #[serde(default)]
    pub freshness: FreshnessSection,
    /// Memory gauge configuration.
    #[serde(default)]
    pub gauge: GaugeSection,
    /// Request limits.
    #[serde(default)]
    pub limits: LimitsSection,
    /// Background job configuration.
    #[serde(default)]
    pub jobs: JobsSection,
}

fn default_service_name() -> String {
    "molopt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            cache: CacheConfig::default(),
            models: ModelsSection::default(),
            freshness: FreshnessSection::default(),
            gauge: GaugeSection::default(),
            limits: LimitsSection::default(),
            jobs: JobsSection::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional file and the process environment.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the file cannot be read or parsed, a
    /// variable has the wrong type, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading environment overrides from `env` instead of
    /// the process environment when given.
    ///
    /// # Errors
    /// Same as [`ServiceConfig::load`].
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml).required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("models.preload")
                .with_list_parse_key("models.preference")
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document, without environment
    /// overrides.
    ///
    /// # Errors
    /// Returns `CoreError::Config` on malformed TOML or failed validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    /// Returns `CoreError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate().map_err(|e| CoreError::Config(e.to_string()))?;
        self.models.validate()?;
        self.limits.validate()?;
        self.jobs.validate()?;
        Ok(())
    }
}
