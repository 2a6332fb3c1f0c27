use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::sys::run_command;

/// Mirror a directory tree.
pub trait CopyTool {
    fn copy_tree(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Robocopy exit codes are bit flags; anything below 8 means every file
/// was copied or deliberately skipped.
pub fn robocopy_succeeded(code: i32) -> bool {
    (0..8).contains(&code)
}

#[derive(Debug, Clone)]
pub struct Robocopy {
    exe: PathBuf,
    retries: u32,
}

impl Robocopy {
    pub fn new(exe: impl Into<PathBuf>, retries: u32) -> Self {
        Self {
            exe: exe.into(),
            retries,
        }
    }
}

impl CopyTool for Robocopy {
    fn copy_tree(&self, source: &Path, target: &Path) -> Result<()> {
        let source_arg = source.display().to_string();
        let target_arg = target.display().to_string();
        let retries = format!("/R:{}", self.retries);
        let output = run_command(
            &self.exe,
            &[
                &source_arg,
                &target_arg,
                "/MIR",
                &retries,
                "/W:2",
                "/NFL",
                "/NDL",
                "/NP",
            ],
            None,
        )?;
        let code = output.code();
        if robocopy_succeeded(code) {
            Ok(())
        } else {
            Err(AppError::CopyFailed {
                source_dir: source.to_path_buf(),
                target_dir: target.to_path_buf(),
                code,
            })
        }
    }
}
