//! Errors surfaced by [`ModelCache`](super::ModelCache).

use molopt_abstraction::ModelError;
use thiserror::Error;

use crate::registry::{ModelId, UnknownModelId};

/// Errors returned by cache acquisition.
///
/// Freshness-store failures never appear here; they are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The requested model is not registered in this deployment.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The registry loader failed. No slot is occupied afterwards.
    #[error("Failed to load model {model}: {source}")]
    LoadFailure {
        /// Model that failed to load.
        model: ModelId,
        /// Error raised by the loader.
        #[source]
        source: ModelError,
    },
}

impl From<UnknownModelId> for CacheError {
    fn from(error: UnknownModelId) -> Self {
        Self::UnknownModel(error.0)
    }
}
