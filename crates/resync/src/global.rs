//! Optional process-wide layer.
//!
//! Prefer passing a [`ResourceLayer`] to collaborators. The global exists for
//! code paths that cannot take one as a parameter.

use std::sync::{Arc, OnceLock};

use crate::error::{LayerError, LayerResult};
use crate::layer::ResourceLayer;

static GLOBAL: OnceLock<Arc<ResourceLayer>> = OnceLock::new();

/// Installs `layer` as the process-wide layer.
///
/// # Errors
///
/// Returns [`LayerError::AlreadyInstalled`] if a layer was installed before;
/// the existing layer is kept.
pub fn install_global(layer: ResourceLayer) -> LayerResult<Arc<ResourceLayer>> {
    let layer = Arc::new(layer);
    GLOBAL
        .set(Arc::clone(&layer))
        .map_err(|_| LayerError::AlreadyInstalled)?;
    tracing::debug!("global resource layer installed");
    Ok(layer)
}

/// The process-wide layer, if one was installed.
pub fn global() -> Option<Arc<ResourceLayer>> {
    GLOBAL.get().cloned()
}
