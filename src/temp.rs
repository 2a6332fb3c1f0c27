use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::error::Result;

/// Scratch directory for one run. Removed on drop unless `keep` was set.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create `base/name`, replacing any leftover from an earlier run.
    pub fn create(base: &Path, name: &str, keep: bool) -> Result<Self> {
        let path = base.join(name);
        fresh_dir(&path)?;
        Ok(Self { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            info!("keeping work directory {}", self.path.display());
            return;
        }
        if let Err(err) = cleanup(&self.path) {
            warn!("could not remove work directory {}: {err}", self.path.display());
        }
    }
}

/// Empty directory at `path`, removing whatever was there.
pub fn fresh_dir(path: &Path) -> Result<()> {
    cleanup(path)?;
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn cleanup(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}
