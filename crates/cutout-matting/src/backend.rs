//! Backend seam and startup factory.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cutout_models::{MediaKind, MediaResult};
use tracing::info;

use crate::config::{BackendKind, MattingConfig};
use crate::error::BackendResult;
use crate::hosted::HostedBackend;
use crate::local::LocalBackend;

/// Removes the background of one input file.
///
/// `kind` is what the user sent; backends may use it to pick an output
/// container. Local outputs are owned by the caller once returned.
#[async_trait]
pub trait MattingBackend: Send + Sync {
    async fn process(&self, input: &Path, kind: MediaKind) -> BackendResult<MediaResult>;

    /// Short identifier for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the configured backend. Called once at process start.
pub fn build_backend(config: &MattingConfig) -> BackendResult<Arc<dyn MattingBackend>> {
    let backend: Arc<dyn MattingBackend> = match config.backend {
        BackendKind::Hosted => Arc::new(HostedBackend::new(config.hosted.clone())?),
        BackendKind::Local => Arc::new(LocalBackend::new(config.local.clone())),
    };

    info!("Matting backend: {}", backend.name());
    Ok(backend)
}
