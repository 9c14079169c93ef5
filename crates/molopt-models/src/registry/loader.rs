//! Loader functions that instantiate a model on a device.

use async_trait::async_trait;
use molopt_abstraction::{Device, ModelError, Potential};
use std::fmt;
use std::sync::Arc;

use super::ModelId;

/// Instantiates a model and places it on a device.
///
/// Implementations may block on I/O (reading weights, device transfer); the
/// cache calls them from inside its exclusive load section.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Loads `id` onto `device`.
    ///
    /// # Errors
    /// Returns a `ModelError` on unsupported hardware, corrupt weights or
    /// device out-of-memory.
    async fn load(&self, id: ModelId, device: &Device) -> Result<Arc<dyn Potential>, ModelError>;
}

type LoadFn = dyn Fn(ModelId, &Device) -> Result<Arc<dyn Potential>, ModelError> + Send + Sync;

/// Adapts a synchronous closure into a [`ModelLoader`].
pub struct FnLoader {
    load: Box<LoadFn>,
}

impl FnLoader {
    /// Wraps `load`.
    pub fn new<F>(load: F) -> Self
    where
        F: Fn(ModelId, &Device) -> Result<Arc<dyn Potential>, ModelError> + Send + Sync + 'static,
    {
        Self { load: Box::new(load) }
    }
}

impl fmt::Debug for FnLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelLoader for FnLoader {
    async fn load(&self, id: ModelId, device: &Device) -> Result<Arc<dyn Potential>, ModelError> {
        (self.load)(id, device)
    }
}
