use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::sys::{run_command, CommandOutput};

/// Attach and detach disk images (ISO files) as drives.
pub trait DiskImageMounter {
    /// Root of the volume if `image` is already attached.
    fn attached_root(&self, image: &Path) -> Result<Option<PathBuf>>;
    fn mount(&self, image: &Path) -> Result<PathBuf>;
    fn dismount(&self, image: &Path) -> Result<()>;
}

/// Storage-module cmdlets driven through `powershell.exe`.
#[derive(Debug, Clone)]
pub struct PowerShellDiskImage {
    exe: PathBuf,
}

impl PowerShellDiskImage {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    fn run_script(&self, image: &Path, script: &str) -> Result<CommandOutput> {
        let output = run_command(
            &self.exe,
            &["-NoProfile", "-NonInteractive", "-Command", script],
            None,
        )?;
        if !output.success() {
            return Err(AppError::DiskImage {
                image: image.to_path_buf(),
                detail: output.detail(),
            });
        }
        Ok(output)
    }
}

impl DiskImageMounter for PowerShellDiskImage {
    fn attached_root(&self, image: &Path) -> Result<Option<PathBuf>> {
        let output = self.run_script(image, &attached_root_script(&image_arg(image)?))?;
        Ok(parse_drive_letter(&output.stdout))
    }

    fn mount(&self, image: &Path) -> Result<PathBuf> {
        let output = self.run_script(image, &mount_script(&image_arg(image)?))?;
        parse_drive_letter(&output.stdout).ok_or_else(|| AppError::DiskImage {
            image: image.to_path_buf(),
            detail: "mounted image has no drive letter".into(),
        })
    }

    fn dismount(&self, image: &Path) -> Result<()> {
        self.run_script(image, &dismount_script(&image_arg(image)?))
            .map(|_| ())
    }
}

/// `-ImagePath` only accepts fully qualified paths. `fs::canonicalize` is
/// not used: its `\\?\` prefix is rejected by the cmdlets.
fn image_arg(image: &Path) -> Result<String> {
    let absolute = std::path::absolute(image).map_err(|e| AppError::DiskImage {
        image: image.to_path_buf(),
        detail: format!("cannot resolve path: {e}"),
    })?;
    Ok(ps_quote(&absolute))
}

fn attached_root_script(image_arg: &str) -> String {
    format!(
        "$i = Get-DiskImage -ImagePath {image_arg} -ErrorAction Stop; \
         if ($i.Attached) {{ ($i | Get-Volume).DriveLetter }}"
    )
}

fn mount_script(image_arg: &str) -> String {
    format!(
        "Mount-DiskImage -ImagePath {image_arg} -StorageType ISO -PassThru -ErrorAction Stop \
         | Get-Volume | Select-Object -ExpandProperty DriveLetter"
    )
}

fn dismount_script(image_arg: &str) -> String {
    format!("Dismount-DiskImage -ImagePath {image_arg} -ErrorAction Stop | Out-Null")
}

fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

fn parse_drive_letter(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .find_map(|line| {
            let mut chars = line.chars();
            match (chars.next(), chars.next()) {
                (Some(letter), None) if letter.is_ascii_alphabetic() => Some(letter),
                _ => None,
            }
        })
        .map(|letter| PathBuf::from(format!("{}:\\", letter.to_ascii_uppercase())))
}

/// A disk image attached for the lifetime of this value.
///
/// An image that was already attached is reused and left attached; only a
/// mount made here is dismounted on drop.
pub struct MountedImage<'a> {
    mounter: &'a dyn DiskImageMounter,
    image: PathBuf,
    root: PathBuf,
    owned: bool,
}

impl<'a> MountedImage<'a> {
    pub fn attach(mounter: &'a dyn DiskImageMounter, image: &Path) -> Result<Self> {
        let (root, owned) = match mounter.attached_root(image)? {
            Some(root) => {
                info!("{} is already attached at {}", image.display(), root.display());
                (root, false)
            }
            None => {
                let root = mounter.mount(image)?;
                info!("mounted {} at {}", image.display(), root.display());
                (root, true)
            }
        };
        Ok(Self {
            mounter,
            image: image.to_path_buf(),
            root,
            owned,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owned(&self) -> bool {
        self.owned
    }
}

impl Drop for MountedImage<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(err) = self.mounter.dismount(&self.image) {
            warn!("failed to dismount {}: {err}", self.image.display());
        }
    }
}
