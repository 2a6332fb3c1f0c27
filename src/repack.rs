//! Rebuilding setup media: unpack the source ISO, drop in the answer file
//! and OEM payload, optionally add VirtIO drivers, and author a new ISO.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::Context;
use crate::copy::CopyTool;
use crate::dism::ImagingTool;
use crate::error::{AppError, Result};
use crate::iso::{DiskImageMounter, MountedImage};
use crate::models::Channel;
use crate::payload::DriverPayload;
use crate::pipeline::add_virtio_drivers;
use crate::sys::run_command;
use crate::temp;

/// Builds a bootable ISO from a directory tree.
pub trait IsoAuthor {
    fn author(&self, root: &Path, output: &Path) -> Result<()>;
}

/// `oscdimg` from the Windows ADK, producing a BIOS + UEFI bootable image.
#[derive(Debug, Clone)]
pub struct Oscdimg {
    exe: PathBuf,
}

impl Oscdimg {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    pub fn boot_data_arg(root: &Path) -> String {
        let bios = root.join("boot").join("etfsboot.com");
        let uefi = root.join("efi").join("microsoft").join("boot").join("efisys.bin");
        format!(
            "-bootdata:2#p0,e,b{}#pEF,e,b{}",
            bios.display(),
            uefi.display()
        )
    }
}

impl IsoAuthor for Oscdimg {
    fn author(&self, root: &Path, output: &Path) -> Result<()> {
        let boot_data = Self::boot_data_arg(root);
        let root_arg = root.display().to_string();
        let output_arg = output.display().to_string();
        let result = run_command(
            &self.exe,
            &["-m", "-o", "-u2", "-udfver102", &boot_data, &root_arg, &output_arg],
            None,
        )?;
        if !result.success() {
            return Err(AppError::IsoAuthoring {
                output: output.to_path_buf(),
                code: result.code(),
                detail: result.detail(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RepackRequest {
    pub source_iso: PathBuf,
    pub output_iso: PathBuf,
    pub answer_file: Option<PathBuf>,
    pub oem_dir: Option<PathBuf>,
    pub virtio: Option<Channel>,
}

pub struct RepackTools<'a> {
    pub imaging: &'a dyn ImagingTool,
    pub mounter: &'a dyn DiskImageMounter,
    pub copier: &'a dyn CopyTool,
    pub author: &'a dyn IsoAuthor,
    pub payload: &'a dyn DriverPayload,
}

impl RepackRequest {
    fn validate(&self) -> Result<()> {
        if !self.source_iso.is_file() {
            return Err(AppError::Config(format!(
                "source ISO {} does not exist",
                self.source_iso.display()
            )));
        }
        if let Some(answer) = &self.answer_file {
            if !answer.is_file() {
                return Err(AppError::Config(format!(
                    "answer file {} does not exist",
                    answer.display()
                )));
            }
        }
        if let Some(oem) = &self.oem_dir {
            if !oem.is_dir() {
                return Err(AppError::Config(format!(
                    "OEM directory {} does not exist",
                    oem.display()
                )));
            }
        }
        Ok(())
    }
}

/// Produce `request.output_iso`. Intermediate files live under `work_dir`;
/// the caller owns its lifetime.
pub fn repack_iso(
    ctx: &Context,
    tools: &RepackTools<'_>,
    request: &RepackRequest,
    work_dir: &Path,
) -> Result<PathBuf> {
    request.validate()?;

    let root = work_dir.join("iso");
    temp::fresh_dir(&root)?;
    {
        let mounted = MountedImage::attach(tools.mounter, &request.source_iso)?;
        tools.copier.copy_tree(mounted.root(), &root)?;
    }
    info!("extracted {} to {}", request.source_iso.display(), root.display());

    if let Some(answer) = &request.answer_file {
        let target = root.join("autounattend.xml");
        fs::copy(answer, &target)?;
        info!("added answer file {}", answer.display());
    }
    if let Some(oem) = &request.oem_dir {
        let target = root.join("sources").join("$OEM$");
        fs::create_dir_all(&target)?;
        tools.copier.copy_tree(oem, &target)?;
        info!("added OEM payload {}", oem.display());
    }
    if let Some(channel) = request.virtio {
        add_virtio_drivers(ctx, tools.imaging, tools.payload, &root, channel)?;
    }

    if let Some(parent) = request.output_iso.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    tools.author.author(&root, &request.output_iso)?;
    ctx.log_op(
        "repack",
        format!(
            "source={} output={}",
            request.source_iso.display(),
            request.output_iso.display()
        ),
    );
    info!("wrote {}", request.output_iso.display());
    Ok(request.output_iso.clone())
}
