//! Offline servicing of a single WIM image: mount, add drivers, commit.
//!
//! Every call owns one mount directory for its whole lifetime. The directory
//! is removed when the session is dropped, whichever way the call ends. A
//! failed injection still unmounts (discarding changes) before returning.
//! If an unmount fails the image stays mounted and its files stay where
//! they are: only an empty mount directory is removed then.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::dism::ImagingTool;
use crate::error::{AppError, Result};
use crate::models::ImageKind;
use crate::sys::CommandOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Created,
    MountDirReady,
    Mounted,
    DriversAdding,
    DriversAdded,
    Unmounting,
    Committed,
    Aborted,
}

impl MountState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MountState::Committed | MountState::Aborted)
    }
}

#[derive(Debug, Clone)]
pub struct InjectionSummary {
    pub wim: PathBuf,
    pub index: u32,
    pub kind: ImageKind,
    pub mount_dir: PathBuf,
    pub drivers_added: Vec<PathBuf>,
    pub state: MountState,
}

/// Mount directory for one image: a sibling of the WIM file, unique per
/// kind, index and run.
pub fn mount_dir_for(wim: &Path, kind: ImageKind, index: u32, run_token: &str) -> PathBuf {
    let parent = wim.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("mount-{kind}-{index}-{run_token}"))
}

/// Inject every driver directory in `drivers` into image `index` of `wim`
/// and commit the result.
pub fn inject_drivers(
    ctx: &Context,
    tool: &dyn ImagingTool,
    wim: &Path,
    drivers: &[PathBuf],
    index: u32,
    kind: ImageKind,
) -> Result<InjectionSummary> {
    let mut session = MountSession::new(ctx, tool, wim, index, kind);
    session.prepare()?;
    session.mount()?;
    let added = match session.add_drivers(drivers) {
        Ok(added) => added,
        Err(err) => {
            session.discard();
            return Err(err);
        }
    };
    session.commit()?;
    info!(
        "{kind} image {} index {index}: {} driver package(s) committed",
        wim.display(),
        added.len()
    );
    Ok(InjectionSummary {
        wim: wim.to_path_buf(),
        index,
        kind,
        mount_dir: session.mount_dir.clone(),
        drivers_added: added,
        state: session.state,
    })
}

struct MountSession<'a> {
    ctx: &'a Context,
    tool: &'a dyn ImagingTool,
    wim: &'a Path,
    index: u32,
    kind: ImageKind,
    mount_dir: PathBuf,
    state: MountState,
    mounted: bool,
}

impl<'a> MountSession<'a> {
    fn new(
        ctx: &'a Context,
        tool: &'a dyn ImagingTool,
        wim: &'a Path,
        index: u32,
        kind: ImageKind,
    ) -> Self {
        Self {
            ctx,
            tool,
            wim,
            index,
            kind,
            mount_dir: mount_dir_for(wim, kind, index, &ctx.run_token),
            state: MountState::Created,
            mounted: false,
        }
    }

    fn transition(&mut self, next: MountState) {
        debug!(
            "{} index {}: {:?} -> {:?}",
            self.wim.display(),
            self.index,
            self.state,
            next
        );
        self.state = next;
    }

    fn abort(&mut self, err: AppError) -> AppError {
        self.transition(MountState::Aborted);
        self.ctx.log_op(
            "abort",
            format!("wim={} index={} error={err}", self.wim.display(), self.index),
        );
        err
    }

    /// Created -> MountDirReady, after the preconditions for mounting hold.
    fn prepare(&mut self) -> Result<()> {
        if !self.wim.is_file() {
            return Err(self.abort(AppError::WimNotFound(self.wim.to_path_buf())));
        }
        if let Err(err) = self.create_mount_dir() {
            return Err(self.abort(err));
        }
        self.transition(MountState::MountDirReady);

        if !self.ctx.elevated {
            return Err(self.abort(AppError::Privilege(self.wim.to_path_buf())));
        }
        if let Err(err) = clear_readonly(self.wim) {
            return Err(self.abort(err));
        }
        Ok(())
    }

    fn create_mount_dir(&self) -> Result<()> {
        let setup_err = |source| AppError::MountSetup {
            path: self.mount_dir.clone(),
            source,
        };
        if self.mount_dir.exists() {
            warn!("removing stale mount directory {}", self.mount_dir.display());
            fs::remove_dir_all(&self.mount_dir).map_err(setup_err)?;
        }
        fs::create_dir_all(&self.mount_dir).map_err(setup_err)
    }

    /// MountDirReady -> Mounted.
    fn mount(&mut self) -> Result<()> {
        let output = invoke(self.tool.mount_wim(self.wim, self.index, &self.mount_dir));
        if !output.success() {
            return Err(self.abort(AppError::MountFailed {
                wim: self.wim.to_path_buf(),
                index: self.index,
                code: output.code(),
                detail: output.detail(),
            }));
        }
        self.mounted = true;
        self.transition(MountState::Mounted);
        self.ctx.log_op(
            "mount",
            format!(
                "wim={} index={} kind={} dir={}",
                self.wim.display(),
                self.index,
                self.kind,
                self.mount_dir.display()
            ),
        );
        Ok(())
    }

    /// Mounted -> DriversAdding -> DriversAdded. Stops at the first failure.
    fn add_drivers(&mut self, drivers: &[PathBuf]) -> Result<Vec<PathBuf>> {
        self.transition(MountState::DriversAdding);
        let mut added = Vec::with_capacity(drivers.len());
        for driver in drivers {
            let output = invoke(self.tool.add_driver(&self.mount_dir, driver));
            if !output.success() {
                return Err(self.abort(AppError::DriverInjection {
                    wim: self.wim.to_path_buf(),
                    index: self.index,
                    driver: driver.clone(),
                    code: output.code(),
                    detail: output.detail(),
                }));
            }
            self.ctx.log_op(
                "add_driver",
                format!(
                    "wim={} index={} driver={}",
                    self.wim.display(),
                    self.index,
                    driver.display()
                ),
            );
            added.push(driver.clone());
        }
        self.transition(MountState::DriversAdded);
        Ok(added)
    }

    /// DriversAdded -> Unmounting -> Committed.
    fn commit(&mut self) -> Result<()> {
        self.transition(MountState::Unmounting);
        let output = invoke(self.tool.unmount_wim(&self.mount_dir, true));
        if !output.success() {
            let err = AppError::CommitFailed {
                wim: self.wim.to_path_buf(),
                index: self.index,
                mount_dir: self.mount_dir.clone(),
                code: output.code(),
                detail: output.detail(),
            };
            error!("{err}");
            return Err(self.abort(err));
        }
        self.mounted = false;
        self.transition(MountState::Committed);
        self.ctx.log_op(
            "commit",
            format!("wim={} index={}", self.wim.display(), self.index),
        );
        Ok(())
    }

    /// Unmount without committing after a failed injection. Best effort: the
    /// injection error is what the caller reports.
    fn discard(&mut self) {
        if !self.mounted {
            return;
        }
        let output = invoke(self.tool.unmount_wim(&self.mount_dir, false));
        if output.success() {
            self.mounted = false;
            self.ctx.log_op(
                "discard",
                format!("wim={} index={}", self.wim.display(), self.index),
            );
        } else {
            warn!(
                "discarding {} index {} failed (exit code {}): {}",
                self.wim.display(),
                self.index,
                output.code(),
                output.detail()
            );
        }
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                "{} index {}: session ended in state {:?}",
                self.wim.display(),
                self.index,
                self.state
            );
        }
        if self.mounted {
            // The directory contents are the mounted image itself; only an
            // empty directory is removed.
            warn!(
                "{} index {} may still be mounted at {}",
                self.wim.display(),
                self.index,
                self.mount_dir.display()
            );
            if let Err(err) = fs::remove_dir(&self.mount_dir) {
                warn!(
                    "leaving mount directory {} in place: {err}",
                    self.mount_dir.display()
                );
            }
            return;
        }
        if self.mount_dir.exists() {
            if let Err(err) = fs::remove_dir_all(&self.mount_dir) {
                warn!(
                    "could not remove mount directory {}: {err}",
                    self.mount_dir.display()
                );
            }
        }
    }
}

/// Fold a failure to start the tool into a failed [`CommandOutput`], so each
/// step reports it under its own error class.
fn invoke(result: Result<CommandOutput>) -> CommandOutput {
    result.unwrap_or_else(|err| CommandOutput {
        exit_code: None,
        stderr: err.to_string(),
        ..CommandOutput::default()
    })
}

fn clear_readonly(wim: &Path) -> Result<()> {
    let mut perms = fs::metadata(wim)?.permissions();
    if perms.readonly() {
        info!("clearing read-only attribute on {}", wim.display());
        perms.set_readonly(false);
        fs::set_permissions(wim, perms)?;
    }
    Ok(())
}
