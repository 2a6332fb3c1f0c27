use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which well-known WIM file an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Boot,
    Install,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Boot => "boot",
            ImageKind::Install => "install",
        }
    }

    /// File name under `sources\` on Windows setup media.
    pub fn wim_file_name(self) -> &'static str {
        match self {
            ImageKind::Boot => "boot.wim",
            ImageKind::Install => "install.wim",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image as reported by `dism /Get-WimInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WimImageInfo {
    pub index: u32,
    pub name: String,
    pub architecture: String,
    /// Every `Key : Value` pair DISM printed for this index, trimmed.
    pub fields: BTreeMap<String, String>,
}

impl WimImageInfo {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// A [`WimImageInfo`] stamped with the file it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WimImageRecord {
    pub info: WimImageInfo,
    pub path: PathBuf,
    pub kind: ImageKind,
}

impl WimImageRecord {
    pub fn new(info: WimImageInfo, path: impl Into<PathBuf>, kind: ImageKind) -> Self {
        Self {
            info,
            path: path.into(),
            kind,
        }
    }

    pub fn index(&self) -> u32 {
        self.info.index
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn architecture(&self) -> &str {
        &self.info.architecture
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    X86,
    X64,
    Arm64,
}

impl Architecture {
    /// Parse the architecture string DISM reports for an image.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "x86" => Some(Architecture::X86),
            "x64" | "amd64" => Some(Architecture::X64),
            "arm64" => Some(Architecture::Arm64),
            _ => None,
        }
    }

    /// Spelling used both by DISM and by the driver directory layout.
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm64 => "ARM64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowsVersion {
    Xp,
    Vista,
    Seven,
    Eight,
    EightOne,
    Ten,
    Eleven,
}

impl WindowsVersion {
    pub fn tag(self) -> &'static str {
        match self {
            WindowsVersion::Xp => "xp",
            WindowsVersion::Vista => "vista",
            WindowsVersion::Seven => "7",
            WindowsVersion::Eight => "8",
            WindowsVersion::EightOne => "8.1",
            WindowsVersion::Ten => "10",
            WindowsVersion::Eleven => "11",
        }
    }
}

impl fmt::Display for WindowsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Per-version directory name in the virtio-win layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverVersion {
    W7,
    W8,
    W8_1,
    W10,
    W11,
}

impl DriverVersion {
    pub fn dir_name(self) -> &'static str {
        match self {
            DriverVersion::W7 => "w7",
            DriverVersion::W8 => "w8",
            DriverVersion::W8_1 => "w8.1",
            DriverVersion::W10 => "w10",
            DriverVersion::W11 => "w11",
        }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverComponent {
    /// virtio-blk storage controller.
    Storage,
    /// virtio-scsi controller.
    Scsi,
    /// virtio-net network adapter.
    Network,
}

impl DriverComponent {
    /// Injection order.
    pub const ALL: [DriverComponent; 3] = [
        DriverComponent::Storage,
        DriverComponent::Scsi,
        DriverComponent::Network,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DriverComponent::Storage => "viostor",
            DriverComponent::Scsi => "vioscsi",
            DriverComponent::Network => "NetKVM",
        }
    }
}

impl fmt::Display for DriverComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Release track of the virtio-win distribution.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Stable,
    Latest,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Latest => "latest",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            Channel::Stable => {
                "https://fedorapeople.org/groups/virt/virtio-win/direct-downloads/stable-virtio/virtio-win.iso"
            }
            Channel::Latest => {
                "https://fedorapeople.org/groups/virt/virtio-win/direct-downloads/latest-virtio/virtio-win.iso"
            }
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
