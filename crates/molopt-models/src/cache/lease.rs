//! Scoped acquisition of a resident model.

use molopt_abstraction::Potential;
use std::fmt;
use std::ops::Deref;

use super::ModelCache;
use super::types::ModelHandle;
use crate::registry::ModelId;

/// A model borrowed from the cache for the duration of one operation.
///
/// Dropping the lease releases the model, on every exit path including early
/// returns and unwinding.
pub struct ModelLease<'a> {
    cache: &'a ModelCache,
    id: ModelId,
    handle: ModelHandle,
}

impl<'a> ModelLease<'a> {
    pub(super) fn new(cache: &'a ModelCache, id: ModelId, handle: ModelHandle) -> Self {
        Self { cache, id, handle }
    }

    /// The leased model's id.
    #[must_use]
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// The underlying shared handle.
    #[must_use]
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }
}

impl Deref for ModelLease<'_> {
    type Target = dyn Potential;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

impl Drop for ModelLease<'_> {
    fn drop(&mut self) {
        self.cache.release(self.id);
    }
}

impl fmt::Debug for ModelLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLease")
            .field("id", &self.id)
            .field("device", &self.handle.device())
            .finish_non_exhaustive()
    }
}
