//! Error types for molopt core.

use molopt_abstraction::{AtomicNumber, ModelError};
use molopt_models::{CacheError, FreshnessError};
use thiserror::Error;

/// Core error type for molopt service operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model cache errors
    #[error("Model cache error: {0}")]
    Cache(#[from] CacheError),

    /// Request failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No registered model supports the structure's elements
    #[error("No available model supports elements {elements:?}")]
    UnsupportedElements {
        /// Distinct atomic numbers of the rejected structure.
        elements: Vec<AtomicNumber>,
    },

    /// The identifier could not be embedded into a 3-D structure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The inference or optimization engine failed
    #[error("Engine error: {0}")]
    Engine(#[from] ModelError),

    /// Freshness store setup errors
    #[error("Freshness store error: {0}")]
    Freshness(#[from] FreshnessError),

    /// Background job errors
    #[error("Job error: {0}")]
    Job(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error was caused by the request rather than by the system.
    ///
    /// User errors are reported back unchanged and never retried.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Cache(CacheError::UnknownModel(_))
            | Self::InvalidInput(_)
            | Self::UnsupportedElements { .. }
            | Self::Embedding(_) => true,
            Self::Engine(error) => matches!(
                error,
                ModelError::InvalidGeometry(_)
                    | ModelError::InvalidIdentifier(_)
                    | ModelError::UnsupportedAlgorithm(_)
            ),
            Self::Cache(CacheError::LoadFailure { .. })
            | Self::Config(_)
            | Self::Freshness(_)
            | Self::Job(_)
            | Self::Io(_) => false,
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}

/// Result type alias for molopt core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
