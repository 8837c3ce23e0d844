use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Per-install working directory, deleted when dropped.
///
/// Installers keep it inside their run metadata so every exit path, including
/// errors and cancellation, removes it.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `path` empty, clearing leftovers from an earlier interrupted run.
    pub fn create(path: PathBuf) -> LauncherResult<Self> {
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| LauncherError::io(&path, e))?;
        }
        std::fs::create_dir_all(&path).map_err(|e| LauncherError::io(&path, e))?;
        debug!("Created scratch directory {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed scratch directory {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch directory {:?}: {}", self.path, e),
        }
    }
}
