//! Closed enumeration of the supported model identifiers.

use molopt_abstraction::AtomicNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A model name that does not correspond to any supported model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown model: {0}")]
pub struct UnknownModelId(pub String);

/// Identifier of a supported neural-network potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    /// ANI-1ccx: coupled-cluster accuracy for H, C, N, O.
    #[serde(rename = "ANI1ccx")]
    Ani1ccx,
    /// ANI-2x: extends coverage to F, S and Cl.
    #[serde(rename = "ANI2x")]
    Ani2x,
    /// ANI-1x: DFT-level model for H, C, N, O.
    #[serde(rename = "ANI1x")]
    Ani1x,
}

impl ModelId {
    /// Every supported model, in declaration order.
    pub const ALL: [Self; 3] = [Self::Ani1ccx, Self::Ani2x, Self::Ani1x];

    /// Canonical model name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ani1ccx => "ANI1ccx",
            Self::Ani2x => "ANI2x",
            Self::Ani1x => "ANI1x",
        }
    }

    /// Elements the published weights were trained on.
    #[must_use]
    pub fn default_elements(&self) -> BTreeSet<AtomicNumber> {
        match self {
            Self::Ani1ccx | Self::Ani1x => [1, 6, 7, 8].into_iter().collect(),
            Self::Ani2x => [1, 6, 7, 8, 9, 16, 17].into_iter().collect(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = UnknownModelId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownModelId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_from_str() {
        assert_eq!(ModelId::from_str("ANI2x"), Ok(ModelId::Ani2x));
        assert_eq!(ModelId::from_str("ani2x"), Ok(ModelId::Ani2x));
        assert_eq!(ModelId::from_str("ANI1CCX"), Ok(ModelId::Ani1ccx));
        assert_eq!(ModelId::from_str(" ani1x "), Ok(ModelId::Ani1x));
        assert_eq!(
            ModelId::from_str("unregistered"),
            Err(UnknownModelId("unregistered".to_string()))
        );
    }

    #[test]
    fn test_model_id_serde_uses_canonical_names() {
        assert_eq!(serde_json::to_string(&ModelId::Ani1ccx).unwrap(), "\"ANI1ccx\"");
        let id: ModelId = serde_json::from_str("\"ANI2x\"").unwrap();
        assert_eq!(id, ModelId::Ani2x);
    }

    #[test]
    fn test_default_elements() {
        assert_eq!(ModelId::Ani1x.default_elements(), ModelId::Ani1ccx.default_elements());
        assert!(ModelId::Ani2x.default_elements().contains(&17));
        assert!(!ModelId::Ani1x.default_elements().contains(&9));
    }
}
