use std::path::PathBuf;

use scheduler::SchedulerError;

use crate::types::AssetRole;

#[derive(Debug, thiserror::Error)]
pub enum DissolveError {
    #[error("failed to load {role} image from {path}: {source}")]
    ResourceLoad {
        role: AssetRole,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("GPU context unavailable: {0:#}")]
    ContextUnavailable(#[source] anyhow::Error),
    #[error("GPU setup failed: {0:#}")]
    Setup(#[source] anyhow::Error),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("asset loader stopped before delivering images")]
    LoaderDisconnected,
    #[error(transparent)]
    Schedule(#[from] SchedulerError),
}

impl DissolveError {
    pub fn as_surface_error(&self) -> Option<&wgpu::SurfaceError> {
        match self {
            DissolveError::Surface(err) => Some(err),
            _ => None,
        }
    }
}
