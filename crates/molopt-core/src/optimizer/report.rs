//! Result types returned by the molecular optimizer.

use molopt_abstraction::{AtomicNumber, OptimizationAlgorithm};
use molopt_models::ModelId;
use serde::{Deserialize, Serialize};

/// Outcome of relaxing one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Identifier the structure was embedded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Model that evaluated the structure.
    pub model_used: ModelId,
    /// Algorithm requested by the caller.
    pub algorithm: OptimizationAlgorithm,
    /// Final energy.
    pub energy: f64,
    /// Final per-atom forces.
    pub forces: Vec<[f64; 3]>,
    /// Final coordinates.
    pub coordinates: Vec<[f64; 3]>,
    /// Atomic numbers in coordinate order.
    pub elements: Vec<AtomicNumber>,
    /// Optimizer steps taken.
    pub steps_taken: u32,
    /// Whether the force threshold was reached.
    pub converged: bool,
    /// Total molecular charge.
    pub charge: i32,
    /// Final structure as XYZ text.
    pub xyz: String,
}

/// Single-point energy of one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    /// Model that evaluated the structure.
    pub model_used: ModelId,
    /// Energy.
    pub energy: f64,
    /// Per-atom forces.
    pub forces: Vec<[f64; 3]>,
    /// Atomic numbers in coordinate order.
    pub elements: Vec<AtomicNumber>,
}

/// Result for one batch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// The identifier as submitted.
    pub identifier: String,
    /// Report, when the entry succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<OptimizationReport>,
    /// Error message, when the entry failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    /// Whether the entry succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.report.is_some()
    }
}

/// Results for a whole batch, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-entry results.
    pub results: Vec<BatchItem>,
    /// Number of entries.
    pub total: usize,
    /// Entries that succeeded.
    pub successful: usize,
    /// Entries that failed.
    pub failed: usize,
}

impl BatchReport {
    /// Builds the totals from per-entry results.
    #[must_use]
    pub fn from_items(results: Vec<BatchItem>) -> Self {
        let successful = results.iter().filter(|item| item.is_success()).count();
        let total = results.len();
        Self { results, total, successful, failed: total - successful }
    }
}
