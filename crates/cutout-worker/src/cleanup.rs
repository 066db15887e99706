//! Temp file ownership for one job.

use std::path::{Path, PathBuf};

use cutout_media::remove_if_exists;
use tracing::{debug, warn};

/// Deletes every tracked file when dropped.
///
/// Dropping covers the normal return, early returns on failure, and the
/// executor abandoning the job future on timeout. Deletion errors are
/// logged and otherwise ignored.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    paths: Vec<PathBuf>,
}

impl CleanupGuard {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![input.into()],
        }
    }

    /// Take ownership of another file. Already-tracked paths are ignored.
    pub fn track(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match remove_if_exists(path) {
                Ok(true) => debug!("Removed temp file {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
    }
}
