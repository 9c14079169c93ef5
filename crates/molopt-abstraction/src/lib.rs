//! Model abstraction layer for molopt.
//!
//! This crate defines the domain vocabulary shared by the model cache and the
//! service layer: devices, molecular geometries, evaluation results, and the
//! collaborator traits for potentials, geometry optimizers and structure
//! embedders.

pub mod elements;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use elements::{atomic_number, element_symbol};

/// Atomic number of a chemical element (H = 1, C = 6, ...).
pub type AtomicNumber = u8;

/// Represents an error that can occur when loading or driving a potential.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The model weights could not be loaded.
    #[error("Load Error: {0}")]
    LoadFailed(String),

    /// The device rejected an allocation, placement or release.
    #[error("Device Error: {0}")]
    Device(String),

    /// The requested device string is not understood.
    #[error("Unsupported Device: {0}")]
    UnsupportedDevice(String),

    /// Coordinates and elements are inconsistent or non-finite.
    #[error("Invalid Geometry: {0}")]
    InvalidGeometry(String),

    /// The requested optimization algorithm is not supported.
    #[error("Unsupported Algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A chemical identifier could not be turned into a structure.
    #[error("Invalid Identifier: {0}")]
    InvalidIdentifier(String),

    /// Energy or force evaluation failed.
    #[error("Evaluation Error: {0}")]
    Evaluation(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// Compute device a potential is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Host memory.
    #[default]
    Cpu,
    /// CUDA accelerator with the given ordinal.
    Cuda(u32),
}

impl Device {
    /// Whether this device lives in bounded accelerator memory.
    #[must_use]
    pub const fn is_accelerator(&self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| ModelError::UnsupportedDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// A molecular structure: one atomic number and one Cartesian position
/// (Angstrom) per atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Atomic number of each atom.
    pub elements: Vec<AtomicNumber>,
    /// Cartesian coordinates of each atom.
    pub coordinates: Vec<[f64; 3]>,
}

impl Geometry {
    /// Creates a geometry, checking that every atom has exactly one position
    /// and that all coordinates are finite.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidGeometry` on mismatched lengths or
    /// non-finite coordinates.
    pub fn new(
        elements: Vec<AtomicNumber>,
        coordinates: Vec<[f64; 3]>,
    ) -> Result<Self, ModelError> {
        if elements.len() != coordinates.len() {
            return Err(ModelError::InvalidGeometry(format!(
                "Number of coordinates ({}) must match number of elements ({})",
                coordinates.len(),
                elements.len()
            )));
        }
        if coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(ModelError::InvalidGeometry(
                "Coordinates must be finite".to_string(),
            ));
        }
        Ok(Self { elements, coordinates })
    }

    /// Number of atoms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the structure has no atoms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Distinct atomic numbers present in the structure.
    #[must_use]
    pub fn element_set(&self) -> BTreeSet<AtomicNumber> {
        self.elements.iter().copied().collect()
    }
}

/// Energy and per-atom forces for one geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Potential energy in Hartree.
    pub energy: f64,
    /// Force on each atom (negative energy gradient).
    pub forces: Vec<[f64; 3]>,
}

impl Evaluation {
    /// Largest per-atom force magnitude, the quantity compared against `fmax`.
    #[must_use]
    pub fn max_force(&self) -> f64 {
        self.forces
            .iter()
            .map(|[x, y, z]| (x * x + y * y + z * z).sqrt())
            .fold(0.0, f64::max)
    }
}

/// Classical optimization loop used to relax a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptimizationAlgorithm {
    /// Limited-memory BFGS.
    #[default]
    #[serde(rename = "LBFGS")]
    Lbfgs,
    /// Full BFGS.
    #[serde(rename = "BFGS")]
    Bfgs,
    /// Fast inertial relaxation engine.
    #[serde(rename = "FIRE")]
    Fire,
}

impl fmt::Display for OptimizationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lbfgs => write!(f, "LBFGS"),
            Self::Bfgs => write!(f, "BFGS"),
            Self::Fire => write!(f, "FIRE"),
        }
    }
}

impl FromStr for OptimizationAlgorithm {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LBFGS" => Ok(Self::Lbfgs),
            "BFGS" => Ok(Self::Bfgs),
            "FIRE" => Ok(Self::Fire),
            _ => Err(ModelError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Parameters for a geometry optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationParameters {
    /// Optimization algorithm.
    #[serde(default)]
    pub algorithm: OptimizationAlgorithm,
    /// Maximum number of optimizer steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Force convergence threshold (largest per-atom force).
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    /// Total molecular charge, carried through to reports.
    #[serde(default)]
    pub charge: i32,
}

fn default_max_steps() -> u32 {
    1000
}

fn default_fmax() -> f64 {
    1e-6
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            algorithm: OptimizationAlgorithm::default(),
            max_steps: default_max_steps(),
            fmax: default_fmax(),
            charge: 0,
        }
    }
}

/// Result of driving an optimizer to convergence or to its step limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// Final geometry.
    pub geometry: Geometry,
    /// Energy and forces at the final geometry.
    pub evaluation: Evaluation,
    /// Number of optimizer steps taken.
    pub steps: u32,
    /// Whether the force threshold was reached.
    pub converged: bool,
}

/// A device-resident computational model able to evaluate energies and forces.
///
/// Handles are owned by the model cache and lent out to callers for the
/// duration of one evaluation or optimization.
#[async_trait]
pub trait Potential: Send + Sync {
    /// Returns the identifier of the loaded model.
    fn model_id(&self) -> &str;

    /// Returns the device the model was placed on.
    fn device(&self) -> Device;

    /// Computes energy and forces for a geometry.
    ///
    /// # Errors
    /// Returns a `ModelError` if evaluation fails (e.g. unsupported element).
    async fn evaluate(&self, geometry: &Geometry) -> Result<Evaluation, ModelError>;

    /// Frees the device resources held by this model.
    ///
    /// Called once by the cache on eviction. The default does nothing, for
    /// models whose memory is reclaimed on drop.
    ///
    /// # Errors
    /// Returns `ModelError::Device` if the device refuses to release memory.
    fn unload(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Drives a potential through a classical optimization loop.
#[async_trait]
pub trait GeometryOptimizer: Send + Sync {
    /// Relaxes `geometry` until the largest force drops below
    /// `parameters.fmax` or `parameters.max_steps` is reached.
    ///
    /// # Errors
    /// Returns a `ModelError` if any evaluation fails.
    async fn optimize(
        &self,
        potential: &dyn Potential,
        geometry: Geometry,
        parameters: &OptimizationParameters,
    ) -> Result<OptimizationOutcome, ModelError>;
}

/// Converts a chemical identifier (e.g. SMILES) into an initial 3-D layout.
pub trait StructureEmbedder: Send + Sync {
    /// Embeds the identifier.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidIdentifier` if the identifier is malformed.
    fn identifier_to_structure(&self, identifier: &str) -> Result<Geometry, ModelError>;
}
