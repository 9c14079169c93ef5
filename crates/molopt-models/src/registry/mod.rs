//! Static mapping from model identifier to supported elements and loader.
//!
//! The registry is built once at startup and never mutated afterwards. It is
//! the boundary at which free-form model names are validated: anything that
//! does not resolve to a registered [`ModelId`] is rejected here, before it
//! reaches the cache.

mod id;
mod loader;

use molopt_abstraction::AtomicNumber;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub use id::{ModelId, UnknownModelId};
pub use loader::{FnLoader, ModelLoader};

/// One registered model.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Model identifier.
    pub id: ModelId,
    /// Atomic numbers the model can evaluate.
    pub supported_elements: BTreeSet<AtomicNumber>,
    /// Loader that instantiates the model on a device.
    pub loader: Arc<dyn ModelLoader>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.id)
            .field("supported_elements", &self.supported_elements)
            .finish_non_exhaustive()
    }
}

/// Immutable, process-wide model registry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<RegistryEntry>,
}

impl ModelRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Registers every [`ModelId`] with its published element set, all
    /// sharing one loader.
    #[must_use]
    pub fn standard(loader: Arc<dyn ModelLoader>) -> Self {
        ModelId::ALL
            .into_iter()
            .fold(Self::builder(), |builder, id| {
                builder.register(id, id.default_elements(), Arc::clone(&loader))
            })
            .build()
    }

    /// Looks up a registered model.
    #[must_use]
    pub fn get(&self, id: ModelId) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ModelId) -> bool {
        self.get(id).is_some()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    /// Element set supported by a registered model.
    #[must_use]
    pub fn supported_elements(&self, id: ModelId) -> Option<&BTreeSet<AtomicNumber>> {
        self.get(id).map(|entry| &entry.supported_elements)
    }

    /// Resolves a free-form model name to a registered id.
    ///
    /// # Errors
    /// Returns `UnknownModelId` if the name is not a known model or the model
    /// is known but not registered in this deployment.
    pub fn resolve(&self, name: &str) -> Result<ModelId, UnknownModelId> {
        let id: ModelId = name.parse()?;
        if self.contains(id) { Ok(id) } else { Err(UnknownModelId(name.to_string())) }
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`ModelRegistry`].
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl ModelRegistryBuilder {
    /// Registers a model. Registering the same id again replaces the earlier
    /// entry but keeps its position.
    #[must_use]
    pub fn register(
        mut self,
        id: ModelId,
        supported_elements: impl IntoIterator<Item = AtomicNumber>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let entry = RegistryEntry {
            id,
            supported_elements: supported_elements.into_iter().collect(),
            loader,
        };
        match self.entries.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ModelRegistry {
        ModelRegistry { entries: self.entries }
    }
}
