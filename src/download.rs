use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

use crate::error::{AppError, Result};

/// Bytes received so far, and the total when the server announced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub received: u64,
    pub total: Option<u64>,
}

impl Progress {
    pub fn percent(&self) -> Option<u32> {
        match self.total {
            Some(total) if total > 0 => Some(((self.received * 100) / total).min(100) as u32),
            _ => None,
        }
    }
}

pub trait Downloader {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path, progress: &mut dyn FnMut(Progress)) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    user_agent: String,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            user_agent: format!("winiso-virtio/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path, progress: &mut dyn FnMut(Progress)) -> Result<u64> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        info!("downloading {url}");
        let mut response = client.get(url).send()?;
        if !response.status().is_success() {
            return Err(AppError::Download {
                url: url.to_string(),
                detail: format!("server returned {}", response.status()),
            });
        }

        let total = response.content_length();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(dest)?;
        let mut buffer = [0u8; 64 * 1024];
        let mut received: u64 = 0;
        progress(Progress { received, total });
        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])?;
            received += read as u64;
            progress(Progress { received, total });
        }
        file.flush()?;
        info!("downloaded {received} bytes to {}", dest.display());
        Ok(received)
    }
}

/// Progress callback that logs every ten percent.
pub fn log_progress() -> impl FnMut(Progress) {
    let mut last_step = None;
    move |p: Progress| {
        if let Some(percent) = p.percent() {
            let step = percent / 10;
            if last_step != Some(step) {
                last_step = Some(step);
                info!("download {percent}% ({} bytes)", p.received);
            }
        }
    }
}
