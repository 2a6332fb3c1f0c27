use std::path::PathBuf;

use thiserror::Error;

use crate::drivers::MissingSegment;

pub type Result<T> = std::result::Result<T, AppError>;

/// Whether a failure ends the run or only the file it concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Skip,
    Fatal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("`{command}` failed with exit code {code}: {detail}")]
    ToolInvocation {
        command: String,
        code: i32,
        detail: String,
    },
    #[error("DISM returned no image information for {}; the WIM may be corrupt or inaccessible", .0.display())]
    EmptyOutput(PathBuf),
    #[error("boot image {} has no install image to borrow its Windows version from", .0.display())]
    NoReferenceImage(PathBuf),
    #[error("unrecognized Windows version in image name \"{0}\"")]
    UnrecognizedVersion(String),
    #[error("no VirtIO drivers are published for Windows {0}")]
    UnsupportedVersion(String),
    #[error("unsupported image architecture \"{0}\"")]
    UnsupportedArchitecture(String),
    #[error("driver {segment} directory not found: {}", .path.display())]
    DriverNotFound {
        segment: MissingSegment,
        path: PathBuf,
    },
    #[error("failed to prepare mount directory {}: {source}", .path.display())]
    MountSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("WIM file not found: {}", .0.display())]
    WimNotFound(PathBuf),
    #[error("administrator privileges are required to service {}", .0.display())]
    Privilege(PathBuf),
    #[error("mounting {} index {index} failed (exit code {code}): {detail}", .wim.display())]
    MountFailed {
        wim: PathBuf,
        index: u32,
        code: i32,
        detail: String,
    },
    #[error("adding driver {} to {} index {index} failed (exit code {code}): {detail}", .driver.display(), .wim.display())]
    DriverInjection {
        wim: PathBuf,
        index: u32,
        driver: PathBuf,
        code: i32,
        detail: String,
    },
    #[error(
        "committing {} index {index} failed (exit code {code}): {detail}. \
         WARNING: the image may still be mounted at {} and the WIM may be inconsistent; \
         run `dism /Cleanup-Wim` or `dism /Unmount-Wim /MountDir:<dir> /Discard` before retrying",
        .wim.display(),
        .mount_dir.display()
    )]
    CommitFailed {
        wim: PathBuf,
        index: u32,
        mount_dir: PathBuf,
        code: i32,
        detail: String,
    },
    #[error("copying {} to {} failed with robocopy exit code {code}", .source_dir.display(), .target_dir.display())]
    CopyFailed {
        source_dir: PathBuf,
        target_dir: PathBuf,
        code: i32,
    },
    #[error("download of {url} failed: {detail}")]
    Download { url: String, detail: String },
    #[error("downloaded file {} is missing or empty", .0.display())]
    DownloadVerification(PathBuf),
    #[error("disk image operation on {} failed: {detail}", .image.display())]
    DiskImage { image: PathBuf, detail: String },
    #[error("building ISO {} failed (exit code {code}): {detail}", .output.display())]
    IsoAuthoring {
        output: PathBuf,
        code: i32,
        detail: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
}

impl AppError {
    /// Only a WIM that is absent or lists nothing may be passed over; every
    /// other failure aborts the run.
    pub fn disposition(&self) -> Disposition {
        match self {
            AppError::WimNotFound(_) | AppError::EmptyOutput(_) => Disposition::Skip,
            _ => Disposition::Fatal,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Message(err.to_string())
    }
}
