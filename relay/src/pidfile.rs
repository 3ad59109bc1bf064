use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Holds the process id in a file and removes the file on drop. Failures are logged only.
pub(super) struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub(super) fn create(path: &Path) -> Option<Self> {
        match std::fs::write(path, std::process::id().to_string()) {
            Ok(()) => {
                info!(path = %path.display(), "Wrote pid file");
                Some(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                warn!(?e, path = %path.display(), "Failed to write pid file");
                None
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(?e, path = %self.path.display(), "Failed to remove pid file");
        }
    }
}
