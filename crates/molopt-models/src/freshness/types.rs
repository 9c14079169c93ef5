//! Core data types for freshness metadata.

use chrono::{DateTime, Utc};
use molopt_abstraction::Device;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ModelId;

/// Store key under which a model's record is published.
#[must_use]
pub fn freshness_key(id: ModelId) -> String {
    format!("model:{}:metadata", id)
}

/// Metadata published when a model becomes resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessRecord {
    /// When the model was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Device the model was placed on.
    pub device: String,
    /// Accelerator memory usage fraction right after the load.
    pub memory_usage: f64,
}

impl FreshnessRecord {
    /// Record for a model loaded now on `device`.
    #[must_use]
    pub fn new(device: Device, memory_usage: f64) -> Self {
        Self {
            loaded_at: Utc::now(),
            device: device.to_string(),
            memory_usage,
        }
    }

    /// Serializes the record to its JSON wire form.
    ///
    /// # Errors
    /// Returns `FreshnessError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, FreshnessError> {
        serde_json::to_string(self)
            .map_err(|e| FreshnessError::Serialization { message: e.to_string() })
    }

    /// Parses a record from its JSON wire form.
    ///
    /// # Errors
    /// Returns `FreshnessError::Serialization` if the payload is malformed.
    pub fn from_json(payload: &str) -> Result<Self, FreshnessError> {
        serde_json::from_str(payload)
            .map_err(|e| FreshnessError::Serialization { message: e.to_string() })
    }
}

/// Errors returned by a freshness store.
///
/// The cache never propagates these to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FreshnessError {
    /// The store could not be reached or refused the command.
    #[error("Freshness store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
    /// A record could not be encoded or decoded.
    #[error("Freshness record serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
    /// The store did not answer within the configured timeout.
    #[error("Freshness store timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_key_format() {
        assert_eq!(freshness_key(ModelId::Ani2x), "model:ANI2x:metadata");
        assert_eq!(freshness_key(ModelId::Ani1ccx), "model:ANI1ccx:metadata");
    }

    #[test]
    fn test_record_json_wire_form() {
        let record = FreshnessRecord::new(Device::Cuda(0), 0.35);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"device\":\"cuda:0\""));
        assert!(json.contains("\"memory_usage\":0.35"));
        assert_eq!(FreshnessRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_malformed_record_is_serialization_error() {
        assert!(matches!(
            FreshnessRecord::from_json("{not json"),
            Err(FreshnessError::Serialization { .. })
        ));
    }
}
