//! Service lifecycle.
//!
//! [`AppState`] wires the model cache and its two callers together from a
//! [`ServiceConfig`] and a set of external collaborators.

use std::sync::Arc;

use molopt_abstraction::{GeometryOptimizer, StructureEmbedder};
use molopt_models::{
    ChainEmbedder, FreshnessStore, InMemoryFreshnessStore, MockLoader, ModelCache, ModelLoader,
    ModelRegistry, ModelSelector, NoAcceleratorGauge, ResourceGauge, SteepestDescentOptimizer,
    SysfsVramGauge, detect_gauge,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{FreshnessBackend, FreshnessSection, GaugeBackend, GaugeSection, ServiceConfig};
use crate::error::{CoreError, Result};
use crate::jobs::JobQueue;
use crate::optimizer::MolecularOptimizer;

/// External collaborators: how models are loaded, how structures are
/// relaxed, and how identifiers become structures.
#[derive(Clone)]
pub struct Backend {
    pub loader: Arc<dyn ModelLoader>,
    pub optimizer: Arc<dyn GeometryOptimizer>,
    pub embedder: Arc<dyn StructureEmbedder>,
}

impl Backend {
    /// The built-in reference collaborators.
    #[must_use]
    pub fn reference() -> Self {
        Self {
            loader: Arc::new(MockLoader::new()),
            optimizer: Arc::new(SteepestDescentOptimizer::new()),
            embedder: Arc::new(ChainEmbedder::new()),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// Overall service readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    /// Every dependency answered.
    Ready,
    /// Serving, but the freshness store is unreachable.
    Degraded,
}

/// Readiness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub status: ReadinessStatus,
    pub accelerator_available: bool,
    pub freshness_connected: bool,
}

/// Running service state.
#[derive(Debug)]
pub struct AppState {
    config: ServiceConfig,
    cache: Arc<ModelCache>,
    optimizer: Arc<MolecularOptimizer>,
    jobs: JobQueue,
    gauge: Arc<dyn ResourceGauge>,
    store: Arc<dyn FreshnessStore>,
}

impl AppState {
    /// Builds the service from configuration and preloads the configured
    /// models.
    ///
    /// Preload failures are logged and do not fail initialisation.
    ///
    /// # Errors
    /// Returns `CoreError::Config` for an invalid cache configuration or an
    /// unavailable freshness backend, and `CoreError::Freshness` if the
    /// store URL is malformed.
    pub async fn init(config: ServiceConfig, backend: Backend) -> Result<Self> {
        let gauge = build_gauge(config.gauge);
        let store = build_store(&config.freshness)?;
        let registry = Arc::new(ModelRegistry::standard(backend.loader));
        let selector = ModelSelector::new(Arc::clone(&registry), config.models.preference.clone());

        let cache = Arc::new(
            ModelCache::new(config.cache.clone(), registry, Arc::clone(&gauge), Arc::clone(&store))
                .map_err(|e| CoreError::Config(e.to_string()))?,
        );
        info!(
            service = %config.service_name,
            device = %cache.device(),
            accelerator_available = gauge.accelerator_available(),
            max_loaded = config.cache.max_loaded,
            "Model cache initialised"
        );

        let optimizer = Arc::new(MolecularOptimizer::new(
            Arc::clone(&cache),
            selector,
            backend.optimizer,
            backend.embedder,
            config.limits,
        ));
        let jobs = JobQueue::new(Arc::clone(&optimizer), &config.jobs);

        if !config.models.preload.is_empty() {
            let loaded = cache.preload(&config.models.preload).await;
            info!(requested = config.models.preload.len(), loaded, "Preload complete");
        }

        Ok(Self { config, cache, optimizer, jobs, gauge, store })
    }

    /// The configuration the service was built from.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The model cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// The synchronous caller.
    #[must_use]
    pub fn optimizer(&self) -> &Arc<MolecularOptimizer> {
        &self.optimizer
    }

    /// The asynchronous caller.
    #[must_use]
    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    /// Checks the service's dependencies.
    ///
    /// An unreachable freshness store degrades readiness but never fails it.
    pub async fn readiness(&self) -> Readiness {
        let timeout = self.cache.config().freshness_timeout();
        let freshness_connected = match tokio::time::timeout(timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Freshness store ping failed");
                false
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Freshness store ping timed out");
                false
            }
        };

        Readiness {
            status: if freshness_connected { ReadinessStatus::Ready } else { ReadinessStatus::Degraded },
            accelerator_available: self.gauge.accelerator_available(),
            freshness_connected,
        }
    }

    /// Cancels outstanding jobs, then unloads every resident model.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.jobs.shutdown().await;
        self.cache.shutdown().await;
    }
}

fn build_gauge(section: GaugeSection) -> Arc<dyn ResourceGauge> {
    match section.backend {
        GaugeBackend::Auto => detect_gauge(section.card),
        GaugeBackend::None => Arc::new(NoAcceleratorGauge),
        GaugeBackend::Sysfs => Arc::new(SysfsVramGauge::new(section.card)),
    }
}

#[cfg(feature = "redis-store")]
fn build_store(section: &FreshnessSection) -> Result<Arc<dyn FreshnessStore>> {
    match section.backend {
        FreshnessBackend::Memory => Ok(Arc::new(InMemoryFreshnessStore::new())),
        FreshnessBackend::Redis => {
            Ok(Arc::new(molopt_models::RedisFreshnessStore::open(&section.url)?))
        }
    }
}

#[cfg(not(feature = "redis-store"))]
fn build_store(section: &FreshnessSection) -> Result<Arc<dyn FreshnessStore>> {
    match section.backend {
        FreshnessBackend::Memory => Ok(Arc::new(InMemoryFreshnessStore::new())),
        FreshnessBackend::Redis => Err(CoreError::Config(format!(
            "freshness backend 'redis' ({}) requires the redis-store feature",
            section.url
        ))),
    }
}
