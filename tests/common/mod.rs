#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use winiso_virtio_lib::context::Context;
use winiso_virtio_lib::dism::ImagingTool;
use winiso_virtio_lib::error::Result;
use winiso_virtio_lib::models::{Channel, DriverComponent};
use winiso_virtio_lib::paths::AppPaths;
use winiso_virtio_lib::payload::DriverPayload;
use winiso_virtio_lib::sys::CommandOutput;

pub const RUN_TOKEN: &str = "t0000001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Info(PathBuf, Option<u32>),
    Mount(PathBuf, u32, PathBuf),
    AddDriver(PathBuf, PathBuf),
    Unmount(PathBuf, bool),
}

/// Scriptable stand-in for DISM that records every invocation.
#[derive(Default)]
pub struct FakeDism {
    listings: HashMap<PathBuf, String>,
    fail_mount: bool,
    /// Zero-based position of the `/Add-Driver` call that fails.
    fail_driver_at: Option<usize>,
    fail_commit: bool,
    fail_discard: bool,
    /// Populate the mount directory on mount and empty it on a successful
    /// unmount, the way a real mount does.
    mounted_content: bool,
    calls: RefCell<Vec<Call>>,
    drivers_added: Cell<usize>,
}

impl FakeDism {
    pub fn with_listing(mut self, wim: &Path, listing: String) -> Self {
        self.listings.insert(wim.to_path_buf(), listing);
        self
    }

    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    pub fn failing_driver_at(mut self, position: usize) -> Self {
        self.fail_driver_at = Some(position);
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn failing_discard(mut self) -> Self {
        self.fail_discard = true;
        self
    }

    pub fn with_mounted_content(mut self) -> Self {
        self.mounted_content = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn mount_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Mount(..)))
            .count()
    }
}

fn exit(failed: bool) -> CommandOutput {
    if failed {
        CommandOutput::new(1, "Error: 0xc1420127\nThe operation failed.")
    } else {
        CommandOutput::new(0, "The operation completed successfully.")
    }
}

impl ImagingTool for FakeDism {
    fn get_wim_info(&self, wim: &Path, index: Option<u32>) -> Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(Call::Info(wim.to_path_buf(), index));
        let listing = self.listings.get(wim).cloned().unwrap_or_default();
        Ok(CommandOutput::new(0, listing))
    }

    fn mount_wim(&self, wim: &Path, index: u32, mount_dir: &Path) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::Mount(
            wim.to_path_buf(),
            index,
            mount_dir.to_path_buf(),
        ));
        assert!(mount_dir.is_dir(), "mount directory must exist before mounting");
        if self.fail_mount {
            return Ok(exit(true));
        }
        if self.mounted_content {
            fs::create_dir_all(mount_dir.join("Windows").join("System32"))?;
        }
        Ok(exit(false))
    }

    fn add_driver(&self, mount_dir: &Path, driver_dir: &Path) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(Call::AddDriver(
            mount_dir.to_path_buf(),
            driver_dir.to_path_buf(),
        ));
        let position = self.drivers_added.get();
        self.drivers_added.set(position + 1);
        Ok(exit(self.fail_driver_at == Some(position)))
    }

    fn unmount_wim(&self, mount_dir: &Path, commit: bool) -> Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(Call::Unmount(mount_dir.to_path_buf(), commit));
        let failed = if commit {
            self.fail_commit
        } else {
            self.fail_discard
        };
        if !failed && self.mounted_content {
            fs::remove_dir_all(mount_dir.join("Windows"))?;
        }
        Ok(exit(failed))
    }
}

/// `dism /Get-WimInfo` style report for `(index, name, architecture)` rows.
pub fn listing(images: &[(u32, &str, &str)]) -> String {
    let mut text = String::from("Deployment Image Servicing and Management tool\n\n");
    for (index, name, arch) in images {
        text.push_str(&format!(
            "Index : {index}\nName : {name}\nDescription : {name}\nArchitecture : {arch}\nSize : 1,024 bytes\n\n"
        ));
    }
    text.push_str("The operation completed successfully.\n");
    text
}

pub fn write_wim(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"MSWIM\0\0\0").unwrap();
}

/// Lay out `<root>/<component>/<version>/<arch>` for every component.
pub fn driver_tree(root: &Path, version: &str, arch: &str) {
    for component in DriverComponent::ALL {
        fs::create_dir_all(root.join(component.dir_name()).join(version).join(arch)).unwrap();
    }
}

pub fn test_context(root: &Path) -> Context {
    Context::new(AppPaths::new(root.join("data")), true).with_run_token(RUN_TOKEN)
}

/// Payload that records how often it was asked for a root.
pub struct CountingPayload {
    pub root: PathBuf,
    pub requests: Cell<u32>,
}

impl CountingPayload {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            requests: Cell::new(0),
        }
    }
}

impl DriverPayload for CountingPayload {
    fn payload_root(&self, _channel: Channel) -> Result<PathBuf> {
        self.requests.set(self.requests.get() + 1);
        Ok(self.root.clone())
    }
}
