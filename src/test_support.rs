//! Recording doubles for the disk-image and copy seams.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::copy::CopyTool;
use crate::error::{AppError, Result};
use crate::iso::DiskImageMounter;

/// Presents `volume` as the root of every mounted image.
pub struct RecordingMounter {
    pub attached: Option<PathBuf>,
    pub volume: PathBuf,
    pub calls: RefCell<Vec<&'static str>>,
}

impl RecordingMounter {
    pub fn new(volume: impl Into<PathBuf>) -> Self {
        Self {
            attached: None,
            volume: volume.into(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// The image is already attached at `volume` before the test starts.
    pub fn attached(volume: impl Into<PathBuf>) -> Self {
        let volume = volume.into();
        Self {
            attached: Some(volume.clone()),
            ..Self::new(volume)
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl DiskImageMounter for RecordingMounter {
    fn attached_root(&self, _image: &Path) -> Result<Option<PathBuf>> {
        self.calls.borrow_mut().push("query");
        Ok(self.attached.clone())
    }

    fn mount(&self, _image: &Path) -> Result<PathBuf> {
        self.calls.borrow_mut().push("mount");
        Ok(self.volume.clone())
    }

    fn dismount(&self, _image: &Path) -> Result<()> {
        self.calls.borrow_mut().push("dismount");
        Ok(())
    }
}

/// Copies trees with plain file operations, or fails every copy.
#[derive(Default)]
pub struct TreeCopier {
    pub fail: bool,
    pub copies: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl CopyTool for TreeCopier {
    fn copy_tree(&self, source: &Path, target: &Path) -> Result<()> {
        self.copies
            .borrow_mut()
            .push((source.to_path_buf(), target.to_path_buf()));
        if self.fail {
            return Err(AppError::CopyFailed {
                source_dir: source.to_path_buf(),
                target_dir: target.to_path_buf(),
                code: 16,
            });
        }
        copy_dir(source, target)
    }
}

fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}
