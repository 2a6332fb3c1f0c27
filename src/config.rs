use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Channel;
use crate::paths::AppPaths;

/// Settings read from the optional JSON config file. Every field has a
/// default, so `{}` is a valid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dism_path: Option<PathBuf>,
    pub robocopy_path: Option<PathBuf>,
    pub powershell_path: Option<PathBuf>,
    pub oscdimg_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub channel: Channel,
    pub channel_urls: BTreeMap<Channel, String>,
    pub keep_work_dir: bool,
    pub copy_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dism_path: None,
            robocopy_path: None,
            powershell_path: None,
            oscdimg_path: None,
            data_dir: None,
            cache_dir: None,
            work_dir: None,
            log_dir: None,
            channel: Channel::Stable,
            channel_urls: BTreeMap::new(),
            keep_work_dir: false,
            copy_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("winiso-virtio"))
    }

    pub fn paths(&self) -> AppPaths {
        let mut paths = AppPaths::new(self.data_dir());
        if let Some(dir) = &self.cache_dir {
            paths = paths.with_cache_dir(dir);
        }
        if let Some(dir) = &self.work_dir {
            paths = paths.with_work_dir(dir);
        }
        if let Some(dir) = &self.log_dir {
            paths = paths.with_log_dir(dir);
        }
        paths
    }
}
