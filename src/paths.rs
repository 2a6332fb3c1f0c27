use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::Result;
use crate::models::Channel;

/// On-disk layout: downloads under `cache`, per-run scratch under `work`,
/// log files under `logs`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
    cache: PathBuf,
    work: PathBuf,
    logs: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache: root.join("cache"),
            work: root.join("work"),
            logs: root.join("logs"),
            root,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = dir.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work = dir.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    /// Cache slot for one driver channel.
    pub fn channel_cache_dir(&self, channel: Channel) -> PathBuf {
        self.cache.join(channel.as_str())
    }

    pub fn work_dir(&self) -> &Path {
        &self.work
    }

    pub fn log_dir(&self) -> &Path {
        &self.logs
    }

    pub fn ops_log_path(&self) -> PathBuf {
        self.logs.join("ops.log")
    }

    /// Ensure the expected directory layout exists.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.root.as_path(),
            self.cache.as_path(),
            self.work.as_path(),
            self.logs.as_path(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
