//! Model selection by required element set.

use molopt_abstraction::AtomicNumber;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::registry::{ModelId, ModelRegistry};

/// Preference order used when a deployment does not configure one.
///
/// ANI-2x covers the widest element set, then the coupled-cluster model, then
/// the DFT-level model.
pub const DEFAULT_PREFERENCE: [ModelId; 3] = [ModelId::Ani2x, ModelId::Ani1ccx, ModelId::Ani1x];

/// Chooses the first model, in a fixed preference order, that supports every
/// requested element.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: Arc<ModelRegistry>,
    preference: Vec<ModelId>,
}

impl ModelSelector {
    /// Creates a selector with an explicit preference order.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>, preference: Vec<ModelId>) -> Self {
        Self { registry, preference }
    }

    /// Creates a selector using [`DEFAULT_PREFERENCE`].
    #[must_use]
    pub fn standard(registry: Arc<ModelRegistry>) -> Self {
        Self::new(registry, DEFAULT_PREFERENCE.to_vec())
    }

    /// The configured preference order.
    #[must_use]
    pub fn preference(&self) -> &[ModelId] {
        &self.preference
    }

    /// Returns the first preferred, registered model whose supported elements
    /// are a superset of `required`, or `None` if no model qualifies.
    ///
    /// `None` means the chemistry is unsupported; callers should reject the
    /// request as invalid input.
    #[must_use]
    pub fn select_best_model(&self, required: &BTreeSet<AtomicNumber>) -> Option<ModelId> {
        let selected = self.preference.iter().copied().find(|&id| self.supports(id, required));
        debug!(elements = ?required, selected = ?selected, "Model selection");
        selected
    }

    /// Whether a registered model supports every element in `required`.
    #[must_use]
    pub fn supports(&self, id: ModelId, required: &BTreeSet<AtomicNumber>) -> bool {
        self.registry
            .supported_elements(id)
            .is_some_and(|supported| required.is_subset(supported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLoader;
    use crate::registry::ModelLoader;

    fn elements(items: &[AtomicNumber]) -> BTreeSet<AtomicNumber> {
        items.iter().copied().collect()
    }

    fn two_model_registry() -> Arc<ModelRegistry> {
        let loader: Arc<dyn ModelLoader> = Arc::new(MockLoader::new());
        Arc::new(
            ModelRegistry::builder()
                .register(ModelId::Ani2x, [1, 6, 7, 8], Arc::clone(&loader))
                .register(ModelId::Ani1x, [1, 6], loader)
                .build(),
        )
    }

    #[test]
    fn test_first_qualifying_model_wins_over_smallest_superset() {
        let selector =
            ModelSelector::new(two_model_registry(), vec![ModelId::Ani2x, ModelId::Ani1x]);
        assert_eq!(selector.select_best_model(&elements(&[1, 6])), Some(ModelId::Ani2x));
    }

    #[test]
    fn test_preference_order_is_respected() {
        let selector =
            ModelSelector::new(two_model_registry(), vec![ModelId::Ani1x, ModelId::Ani2x]);
        assert_eq!(selector.select_best_model(&elements(&[1, 6])), Some(ModelId::Ani1x));
        assert_eq!(selector.select_best_model(&elements(&[1, 8])), Some(ModelId::Ani2x));
    }

    #[test]
    fn test_no_superset_returns_none() {
        let selector = ModelSelector::standard(two_model_registry());
        assert_eq!(selector.select_best_model(&elements(&[1, 6, 9, 17])), None);
    }

    #[test]
    fn test_unregistered_preferences_are_skipped() {
        let selector = ModelSelector::standard(two_model_registry());
        // ANI1ccx is preferred over ANI1x but is not registered.
        assert_eq!(selector.preference()[1], ModelId::Ani1ccx);
        assert_eq!(selector.select_best_model(&elements(&[1])), Some(ModelId::Ani2x));
        assert!(!selector.supports(ModelId::Ani1ccx, &elements(&[1])));
    }

    #[test]
    fn test_standard_registry_selection() {
        let registry = Arc::new(ModelRegistry::standard(Arc::new(MockLoader::new())));
        let selector = ModelSelector::standard(registry);
        assert_eq!(selector.select_best_model(&elements(&[1, 6, 7, 8])), Some(ModelId::Ani2x));
        assert_eq!(selector.select_best_model(&elements(&[6, 17])), Some(ModelId::Ani2x));
        assert_eq!(selector.select_best_model(&elements(&[6, 35])), None);
    }

    #[test]
    fn test_empty_requirement_selects_first_registered_preference() {
        let selector = ModelSelector::standard(two_model_registry());
        assert_eq!(selector.select_best_model(&BTreeSet::new()), Some(ModelId::Ani2x));
    }
}
