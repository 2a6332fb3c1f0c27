use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::WimImageInfo;
use crate::sys::{run_command, CommandOutput};

/// The offline-imaging operations the WIM pipeline depends on.
///
/// Implementations return `Err` only when the tool could not be started; a
/// non-zero exit is reported through [`CommandOutput`] so callers can decide
/// which error class it belongs to.
pub trait ImagingTool {
    /// `/Get-WimInfo`, for every image or for one index.
    fn get_wim_info(&self, wim: &Path, index: Option<u32>) -> Result<CommandOutput>;
    fn mount_wim(&self, wim: &Path, index: u32, mount_dir: &Path) -> Result<CommandOutput>;
    fn add_driver(&self, mount_dir: &Path, driver_dir: &Path) -> Result<CommandOutput>;
    /// `/Unmount-Wim` with `/Commit` or `/Discard`.
    fn unmount_wim(&self, mount_dir: &Path, commit: bool) -> Result<CommandOutput>;
}

/// `dism.exe`, always run with `/English` so the report keys parse.
#[derive(Debug, Clone)]
pub struct Dism {
    exe: PathBuf,
}

impl Dism {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut full = vec!["/English"];
        full.extend_from_slice(args);
        run_command(&self.exe, &full, None)
    }
}

impl ImagingTool for Dism {
    fn get_wim_info(&self, wim: &Path, index: Option<u32>) -> Result<CommandOutput> {
        let wim_arg = format!("/WimFile:{}", wim.display());
        match index {
            Some(index) => {
                let index_arg = format!("/Index:{index}");
                self.run(&["/Get-WimInfo", &wim_arg, &index_arg])
            }
            None => self.run(&["/Get-WimInfo", &wim_arg]),
        }
    }

    fn mount_wim(&self, wim: &Path, index: u32, mount_dir: &Path) -> Result<CommandOutput> {
        self.run(&[
            "/Mount-Wim",
            &format!("/WimFile:{}", wim.display()),
            &format!("/Index:{index}"),
            &format!("/MountDir:{}", mount_dir.display()),
        ])
    }

    fn add_driver(&self, mount_dir: &Path, driver_dir: &Path) -> Result<CommandOutput> {
        self.run(&[
            &format!("/Image:{}", mount_dir.display()),
            "/Add-Driver",
            &format!("/Driver:{}", driver_dir.display()),
            "/Recurse",
        ])
    }

    fn unmount_wim(&self, mount_dir: &Path, commit: bool) -> Result<CommandOutput> {
        let mode = if commit { "/Commit" } else { "/Discard" };
        self.run(&[
            "/Unmount-Wim",
            &format!("/MountDir:{}", mount_dir.display()),
            mode,
        ])
    }
}

/// List the images inside a WIM file.
///
/// The summary listing does not carry the architecture, so images that lack
/// one are refined with a per-index query.
pub fn read_images(tool: &dyn ImagingTool, wim: &Path) -> Result<Vec<WimImageInfo>> {
    let output = tool.get_wim_info(wim, None)?;
    let mut images = parse_listing(wim, None, &output)?;

    for image in images.iter_mut().filter(|i| i.architecture.is_empty()) {
        let detail = tool.get_wim_info(wim, Some(image.index))?;
        let refined = parse_listing(wim, Some(image.index), &detail)?;
        if let Some(found) = refined.into_iter().find(|r| r.index == image.index) {
            merge_fields(image, found);
        }
        debug!(
            "wim={} index={} architecture={}",
            wim.display(),
            image.index,
            image.architecture
        );
    }

    let mut seen = HashSet::new();
    if let Some(dup) = images.iter().find(|i| !seen.insert(i.index)) {
        return Err(AppError::Message(format!(
            "{} reports index {} more than once",
            wim.display(),
            dup.index
        )));
    }
    Ok(images)
}

fn parse_listing(
    wim: &Path,
    index: Option<u32>,
    output: &CommandOutput,
) -> Result<Vec<WimImageInfo>> {
    if !output.success() {
        // Outputs that did not come from a process carry no command line.
        let command = if output.command.is_empty() {
            let mut operation = format!("/Get-WimInfo /WimFile:{}", wim.display());
            if let Some(index) = index {
                operation.push_str(&format!(" /Index:{index}"));
            }
            operation
        } else {
            output.command.clone()
        };
        return Err(AppError::ToolInvocation {
            command,
            code: output.code(),
            detail: output.detail(),
        });
    }
    if output.stdout.trim().is_empty() {
        return Err(AppError::EmptyOutput(wim.to_path_buf()));
    }
    let images = parse_wim_info(&output.stdout);
    if images.is_empty() {
        return Err(AppError::EmptyOutput(wim.to_path_buf()));
    }
    Ok(images)
}

fn merge_fields(image: &mut WimImageInfo, detail: WimImageInfo) {
    for (key, value) in detail.fields {
        image.fields.entry(key).or_insert(value);
    }
    if image.name.is_empty() {
        image.name = detail.name;
    }
    if image.architecture.is_empty() {
        image.architecture = detail.architecture;
    }
}

/// Parse DISM's `Key : Value` report. Each `Index : <n>` line opens a new
/// image; lines before the first index are ignored.
pub fn parse_wim_info(text: &str) -> Vec<WimImageInfo> {
    let mut result = Vec::new();
    let mut current: Option<WimImageInfo> = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key == "Index" {
            if let Ok(idx) = value.parse::<u32>() {
                if let Some(info) = current.take() {
                    result.push(finish(info));
                }
                current = Some(WimImageInfo {
                    index: idx,
                    ..WimImageInfo::default()
                });
                continue;
            }
        }
        if let Some(info) = current.as_mut() {
            if !key.is_empty() {
                info.fields.insert(key.to_string(), value.to_string());
            }
        }
    }
    if let Some(info) = current {
        result.push(finish(info));
    }
    result
}

fn finish(mut info: WimImageInfo) -> WimImageInfo {
    info.name = info.field("Name").unwrap_or_default().to_string();
    info.architecture = info.field("Architecture").unwrap_or_default().to_string();
    info
}
