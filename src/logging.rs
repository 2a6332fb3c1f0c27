use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
    sync::Mutex,
};

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::Result;

/// Install the console and rolling-file subscribers. Keep the returned guard
/// alive for as long as file logging should keep flushing.
pub fn init_tracing(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    let default_level = if verbose { "debug" } else { "info" };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "winiso-virtio.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter());
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| crate::error::AppError::Message(format!("tracing init failed: {e}")))?;
    Ok(guard)
}

/// Append-only record of every state-changing operation on an image.
#[derive(Debug)]
pub struct OpsLogger {
    file: Mutex<std::fs::File>,
}

impl OpsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn log_line(&self, action: &str, detail: impl AsRef<str>) -> Result<()> {
        let ts = Utc::now().to_rfc3339();
        let line = format!("{ts} [{action}] {}\n", detail.as_ref());
        let mut guard = self.file.lock().expect("logger mutex poisoned");
        guard.write_all(line.as_bytes())?;
        Ok(())
    }
}
