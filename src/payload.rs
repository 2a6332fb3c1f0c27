//! Fetching and unpacking the virtio-win driver distribution.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::Context;
use crate::copy::CopyTool;
use crate::download::{Downloader, Progress};
use crate::error::{AppError, Result};
use crate::iso::{DiskImageMounter, MountedImage};
use crate::models::Channel;
use crate::temp;

const ISO_FILE_NAME: &str = "virtio-win.iso";
const EXTRACT_DIR_NAME: &str = "virtio-win";

/// Source of an unpacked driver tree laid out as
/// `<root>/<component>/<driver version>/<architecture>`.
pub trait DriverPayload {
    fn payload_root(&self, channel: Channel) -> Result<PathBuf>;
}

/// A driver tree that is already on disk.
#[derive(Debug, Clone)]
pub struct ExtractedPayload {
    root: PathBuf,
}

impl ExtractedPayload {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DriverPayload for ExtractedPayload {
    fn payload_root(&self, _channel: Channel) -> Result<PathBuf> {
        if !self.root.is_dir() {
            return Err(AppError::Config(format!(
                "driver payload directory {} does not exist",
                self.root.display()
            )));
        }
        Ok(self.root.clone())
    }
}

/// Downloads (once per channel, cached) and extracts the virtio-win ISO.
pub struct VirtioWinPayload<'a> {
    pub ctx: &'a Context,
    pub downloader: &'a dyn Downloader,
    pub mounter: &'a dyn DiskImageMounter,
    pub copier: &'a dyn CopyTool,
    pub work_dir: PathBuf,
}

impl DriverPayload for VirtioWinPayload<'_> {
    fn payload_root(&self, channel: Channel) -> Result<PathBuf> {
        let mut progress = crate::download::log_progress();
        acquire_and_extract(
            self.ctx,
            self.downloader,
            self.mounter,
            self.copier,
            channel,
            &self.work_dir,
            &mut progress,
        )
    }
}

pub fn cached_iso_path(ctx: &Context, channel: Channel) -> PathBuf {
    ctx.paths.channel_cache_dir(channel).join(ISO_FILE_NAME)
}

/// Return the cached ISO for `channel`, downloading it only when the cache
/// slot is empty. Cached files never expire.
pub fn ensure_cached(
    ctx: &Context,
    downloader: &dyn Downloader,
    channel: Channel,
    progress: &mut dyn FnMut(Progress),
) -> Result<PathBuf> {
    let iso = cached_iso_path(ctx, channel);
    if non_empty_file(&iso) {
        info!("using cached {channel} driver ISO {}", iso.display());
        return Ok(iso);
    }

    let url = ctx.channel_url(channel);
    let partial = iso.with_extension("iso.part");
    if let Some(parent) = iso.parent() {
        fs::create_dir_all(parent)?;
    }
    downloader.download(&url, &partial, progress)?;
    if !non_empty_file(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(AppError::DownloadVerification(iso));
    }
    fs::rename(&partial, &iso)?;
    ctx.log_op("download", format!("channel={channel} url={url}"));
    Ok(iso)
}

/// Make the `channel` driver tree available under `work_dir` and return
/// its root.
pub fn acquire_and_extract(
    ctx: &Context,
    downloader: &dyn Downloader,
    mounter: &dyn DiskImageMounter,
    copier: &dyn CopyTool,
    channel: Channel,
    work_dir: &Path,
    progress: &mut dyn FnMut(Progress),
) -> Result<PathBuf> {
    let iso = ensure_cached(ctx, downloader, channel, progress)?;
    let target = work_dir.join(EXTRACT_DIR_NAME);
    temp::fresh_dir(&target)?;

    let mounted = MountedImage::attach(mounter, &iso)?;
    copier.copy_tree(mounted.root(), &target)?;
    if !mounted.owned() {
        info!("{} was attached before this run, leaving it attached", iso.display());
    }
    drop(mounted);

    info!("extracted {channel} drivers to {}", target.display());
    Ok(target)
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
