use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::Result;
use crate::logging::OpsLogger;
use crate::models::Channel;
use crate::paths::AppPaths;

/// Everything a pipeline step needs to know about its environment. Built
/// once per run and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Context {
    pub dism: PathBuf,
    pub robocopy: PathBuf,
    pub powershell: PathBuf,
    pub oscdimg: PathBuf,
    /// Whether the process may service images; DISM refuses otherwise.
    pub elevated: bool,
    pub paths: AppPaths,
    /// Qualifies mount directories so concurrent runs never collide.
    pub run_token: String,
    pub keep_work_dir: bool,
    pub copy_retries: u32,
    channel_urls: BTreeMap<Channel, String>,
    ops: Option<Arc<OpsLogger>>,
}

impl Context {
    /// Context with bare tool names resolved through `PATH`.
    pub fn new(paths: AppPaths, elevated: bool) -> Self {
        Self::from_config(&AppConfig::default(), paths, elevated)
    }

    pub fn from_config(config: &AppConfig, paths: AppPaths, elevated: bool) -> Self {
        let tool = |configured: &Option<PathBuf>, name: &str| {
            configured.clone().unwrap_or_else(|| PathBuf::from(name))
        };
        Self {
            dism: tool(&config.dism_path, "dism.exe"),
            robocopy: tool(&config.robocopy_path, "robocopy.exe"),
            powershell: tool(&config.powershell_path, "powershell.exe"),
            oscdimg: tool(&config.oscdimg_path, "oscdimg.exe"),
            elevated,
            paths,
            run_token: new_run_token(),
            keep_work_dir: config.keep_work_dir,
            copy_retries: config.copy_retries,
            channel_urls: config.channel_urls.clone(),
            ops: None,
        }
    }

    /// Attach the operations log at the layout's default location.
    pub fn with_ops_log(mut self) -> Result<Self> {
        let logger = OpsLogger::new(self.paths.ops_log_path())?;
        self.ops = Some(Arc::new(logger));
        Ok(self)
    }

    pub fn with_channel_url(mut self, channel: Channel, url: impl Into<String>) -> Self {
        self.channel_urls.insert(channel, url.into());
        self
    }

    pub fn with_run_token(mut self, token: impl Into<String>) -> Self {
        self.run_token = token.into();
        self
    }

    pub fn channel_url(&self, channel: Channel) -> String {
        self.channel_urls
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| channel.default_url().to_string())
    }

    pub fn work_dir(&self) -> &Path {
        self.paths.work_dir()
    }

    /// Record an operation; failures to write the log never abort a step.
    pub fn log_op(&self, action: &str, detail: impl AsRef<str>) {
        if let Some(logger) = &self.ops {
            let _ = logger.log_line(action, detail);
        }
    }
}

fn new_run_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
