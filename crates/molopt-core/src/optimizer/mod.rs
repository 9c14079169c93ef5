//! Structure optimization on top of the model cache.
//!
//! [`MolecularOptimizer`] is the synchronous caller of the cache: it validates
//! a structure, picks a model for its elements, leases the model for exactly
//! one evaluation or optimization run, and turns the engine's output into a
//! report.

mod report;

use molopt_abstraction::{
    Geometry, GeometryOptimizer, ModelError, OptimizationParameters, StructureEmbedder,
};
use molopt_models::{CacheError, ModelCache, ModelId, ModelSelector};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LimitsSection;
use crate::error::{CoreError, Result};
use crate::xyz::structure_to_xyz;

pub use report::{BatchItem, BatchReport, EnergyReport, OptimizationReport};

/// Progress callback: percentage in `[0, 100]` and a short stage message.
pub type ProgressFn<'a> = &'a (dyn Fn(f64, &str) + Send + Sync);

fn no_progress(_: f64, _: &str) {}

/// Validates, selects a model, and runs the engine under a model lease.
pub struct MolecularOptimizer {
    cache: Arc<ModelCache>,
    selector: ModelSelector,
    optimizer: Arc<dyn GeometryOptimizer>,
    embedder: Arc<dyn StructureEmbedder>,
    limits: LimitsSection,
}

impl std::fmt::Debug for MolecularOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MolecularOptimizer")
            .field("selector", &self.selector)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl MolecularOptimizer {
    /// Creates an optimizer.
    ///
    /// # Arguments
    /// * `cache` - Cache models are leased from
    /// * `selector` - Chooses a model when the caller does not name one
    /// * `optimizer` - Engine driving the relaxation loop
    /// * `embedder` - Converts identifiers into initial structures
    /// * `limits` - Request size limits
    #[must_use]
    pub fn new(
        cache: Arc<ModelCache>,
        selector: ModelSelector,
        optimizer: Arc<dyn GeometryOptimizer>,
        embedder: Arc<dyn StructureEmbedder>,
        limits: LimitsSection,
    ) -> Self {
        Self { cache, selector, optimizer, embedder, limits }
    }

    /// The cache models are leased from.
    #[must_use]
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// The model selector.
    #[must_use]
    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// Configured request limits.
    #[must_use]
    pub fn limits(&self) -> LimitsSection {
        self.limits
    }

    /// Checks a structure against the request limits.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidInput` for an empty or oversized structure,
    /// mismatched element and coordinate counts, or non-finite coordinates.
    pub fn validate_geometry(&self, geometry: &Geometry) -> Result<()> {
        if geometry.is_empty() {
            return Err(CoreError::InvalidInput("Structure has no atoms".to_string()));
        }
        if geometry.len() > self.limits.max_atoms {
            return Err(CoreError::InvalidInput(format!(
                "Structure has {} atoms, the limit is {}",
                geometry.len(),
                self.limits.max_atoms
            )));
        }
        if geometry.elements.len() != geometry.coordinates.len() {
            return Err(CoreError::InvalidInput(
                "Number of coordinates must match number of elements".to_string(),
            ));
        }
        if geometry.coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(CoreError::InvalidInput("Coordinates must be finite".to_string()));
        }
        Ok(())
    }

    fn validate_parameters(parameters: &OptimizationParameters) -> Result<()> {
        if parameters.max_steps == 0 {
            return Err(CoreError::InvalidInput("max_steps must be greater than 0".to_string()));
        }
        if !(parameters.fmax.is_finite() && parameters.fmax > 0.0) {
            return Err(CoreError::InvalidInput("fmax must be a positive number".to_string()));
        }
        Ok(())
    }

    /// Picks the model for a structure.
    ///
    /// An explicitly requested model must be registered and support every
    /// element; otherwise the selector's first qualifying model is used.
    ///
    /// # Errors
    /// * `CoreError::Cache(CacheError::UnknownModel)` for an unregistered model.
    /// * `CoreError::UnsupportedElements` when no suitable model exists.
    pub fn resolve_model(&self, geometry: &Geometry, requested: Option<ModelId>) -> Result<ModelId> {
        let elements = geometry.element_set();
        match requested {
            Some(id) => {
                if !self.cache.registry().contains(id) {
                    return Err(CacheError::UnknownModel(id.to_string()).into());
                }
                if !self.selector.supports(id, &elements) {
                    return Err(CoreError::UnsupportedElements {
                        elements: elements.into_iter().collect(),
                    });
                }
                Ok(id)
            }
            None => self.selector.select_best_model(&elements).ok_or_else(|| {
                CoreError::UnsupportedElements { elements: elements.into_iter().collect() }
            }),
        }
    }

    /// Converts an identifier into an initial structure.
    ///
    /// # Errors
    /// Returns `CoreError::Embedding` if the identifier is malformed.
    pub fn embed(&self, identifier: &str) -> Result<Geometry> {
        self.embedder.identifier_to_structure(identifier).map_err(|e| match e {
            ModelError::InvalidIdentifier(message) => CoreError::Embedding(message),
            other => CoreError::Embedding(other.to_string()),
        })
    }

    /// Relaxes a structure.
    ///
    /// # Errors
    /// Returns a user error for invalid input or unsupported chemistry, and a
    /// system error when the model cannot be loaded or the engine fails.
    pub async fn optimize_structure(
        &self,
        geometry: Geometry,
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
    ) -> Result<OptimizationReport> {
        self.run_optimization(None, geometry, model, parameters, &no_progress).await
    }

    /// Computes the energy and forces of a structure without moving it.
    ///
    /// # Errors
    /// Same as [`MolecularOptimizer::optimize_structure`].
    pub async fn calculate_energy(
        &self,
        geometry: &Geometry,
        model: Option<ModelId>,
    ) -> Result<EnergyReport> {
        self.validate_geometry(geometry)?;
        let model_id = self.resolve_model(geometry, model)?;

        let lease = self.cache.lease(model_id).await?;
        let evaluation = lease.evaluate(geometry).await?;
        drop(lease);

        debug!(model = %model_id, atoms = geometry.len(), energy = evaluation.energy, "Energy calculated");
        Ok(EnergyReport {
            model_used: model_id,
            energy: evaluation.energy,
            forces: evaluation.forces,
            elements: geometry.elements.clone(),
        })
    }

    /// Embeds an identifier and relaxes the resulting structure.
    ///
    /// # Errors
    /// Returns `CoreError::Embedding` for a malformed identifier, otherwise
    /// the same as [`MolecularOptimizer::optimize_structure`].
    pub async fn optimize_identifier(
        &self,
        identifier: &str,
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
    ) -> Result<OptimizationReport> {
        self.optimize_identifier_with_progress(identifier, model, parameters, &no_progress).await
    }

    /// [`MolecularOptimizer::optimize_identifier`] reporting stage progress:
    /// 10 embedding, 30 loading model, 50 optimizing, 90 finalizing.
    ///
    /// # Errors
    /// Same as [`MolecularOptimizer::optimize_identifier`].
    pub async fn optimize_identifier_with_progress(
        &self,
        identifier: &str,
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
        progress: ProgressFn<'_>,
    ) -> Result<OptimizationReport> {
        progress(10.0, "Embedding structure");
        let geometry = self.embed(identifier)?;
        self.run_optimization(Some(identifier), geometry, model, parameters, progress).await
    }

    /// Relaxes every identifier in `identifiers`.
    ///
    /// Failures are recorded per entry and never abort the batch.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidInput` if the batch is empty or larger than
    /// the configured limit.
    pub async fn batch_optimize(
        &self,
        identifiers: &[String],
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
    ) -> Result<BatchReport> {
        self.batch_optimize_with_progress(identifiers, model, parameters, &no_progress).await
    }

    /// [`MolecularOptimizer::batch_optimize`] reporting progress after each
    /// entry.
    ///
    /// # Errors
    /// Same as [`MolecularOptimizer::batch_optimize`].
    pub async fn batch_optimize_with_progress(
        &self,
        identifiers: &[String],
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
        progress: ProgressFn<'_>,
    ) -> Result<BatchReport> {
        if identifiers.is_empty() {
            return Err(CoreError::InvalidInput("Batch is empty".to_string()));
        }
        if identifiers.len() > self.limits.max_batch_size {
            return Err(CoreError::InvalidInput(format!(
                "Batch has {} entries, the limit is {}",
                identifiers.len(),
                self.limits.max_batch_size
            )));
        }

        let total = identifiers.len();
        let mut results = Vec::with_capacity(total);
        for (index, identifier) in identifiers.iter().enumerate() {
            let item = match self.optimize_identifier(identifier, model, parameters).await {
                Ok(report) => BatchItem { identifier: identifier.clone(), report: Some(report), error: None },
                Err(e) => {
                    warn!(identifier = %identifier, error = %e, "Batch entry failed");
                    BatchItem { identifier: identifier.clone(), report: None, error: Some(e.to_string()) }
                }
            };
            results.push(item);
            let done = index + 1;
            progress(done as f64 * 100.0 / total as f64, &format!("Processed {}/{}", done, total));
        }

        let report = BatchReport::from_items(results);
        info!(total = report.total, successful = report.successful, failed = report.failed, "Batch complete");
        Ok(report)
    }

    async fn run_optimization(
        &self,
        identifier: Option<&str>,
        geometry: Geometry,
        model: Option<ModelId>,
        parameters: &OptimizationParameters,
        progress: ProgressFn<'_>,
    ) -> Result<OptimizationReport> {
        self.validate_geometry(&geometry)?;
        Self::validate_parameters(parameters)?;
        let model_id = self.resolve_model(&geometry, model)?;

        progress(30.0, "Loading model");
        let lease = self.cache.lease(model_id).await?;

        progress(50.0, "Optimizing structure");
        let outcome = self.optimizer.optimize(&*lease, geometry, parameters).await?;
        drop(lease);

        progress(90.0, "Finalizing");
        info!(
            model = %model_id,
            algorithm = %parameters.algorithm,
            steps = outcome.steps,
            converged = outcome.converged,
            energy = outcome.evaluation.energy,
            "Optimization complete"
        );

        let comment = format!(
            "{} energy={:.6} model={}",
            identifier.unwrap_or("structure"),
            outcome.evaluation.energy,
            model_id
        );
        Ok(OptimizationReport {
            identifier: identifier.map(ToString::to_string),
            model_used: model_id,
            algorithm: parameters.algorithm,
            energy: outcome.evaluation.energy,
            forces: outcome.evaluation.forces,
            xyz: structure_to_xyz(&outcome.geometry, &comment),
            coordinates: outcome.geometry.coordinates,
            elements: outcome.geometry.elements,
            steps_taken: outcome.steps,
            converged: outcome.converged,
            charge: parameters.charge,
        })
    }
}
