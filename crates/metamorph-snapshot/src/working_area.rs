//! Request-scoped working areas
//!
//! A working area is a fresh directory owned by exactly one healing run. It is
//! removed when the guard is closed or dropped, so every exit path of the
//! pipeline (including early returns via `?`) reclaims the disk space.

use metamorph_core::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Exclusively owned, self-deleting directory for one healing run
#[derive(Debug)]
pub struct WorkingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkingArea {
    /// Create a new working area under `parent` (system temp dir when `None`)
    pub fn create(parent: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let path = dir.path().to_path_buf();
        info!("Created working area at {:?}", path);

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Root of the working area
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the working area now, surfacing any removal error
    pub fn close(mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            debug!("Removing working area {:?}", self.path);
            dir.close()?;
        }
        Ok(())
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            debug!("Removing working area {:?}", self.path);
            if let Err(e) = dir.close() {
                warn!("Failed to remove working area {:?}: {}", self.path, e);
            }
        }
    }
}
