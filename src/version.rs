//! Windows version and architecture mapping. Everything here is pure.

use crate::error::{AppError, Result};
use crate::models::{Architecture, DriverVersion, ImageKind, WimImageRecord, WindowsVersion};

enum Pattern {
    Literal(&'static str),
    /// `prefix` followed by one ASCII digit in `lo..=hi`.
    DigitAfter(&'static str, char, char),
}

impl Pattern {
    fn matches(&self, haystack: &str) -> bool {
        match self {
            Pattern::Literal(needle) => haystack.contains(needle),
            Pattern::DigitAfter(prefix, lo, hi) => haystack
                .match_indices(prefix)
                .filter_map(|(at, _)| haystack[at + prefix.len()..].chars().next())
                .any(|c| (*lo..=*hi).contains(&c)),
        }
    }
}

/// Ordered; the first match wins, so longer or newer names come first.
/// Needles are lowercase and matched against the lowercased image name.
const VERSION_PATTERNS: &[(Pattern, WindowsVersion)] = &[
    (Pattern::Literal("windows 11"), WindowsVersion::Eleven),
    (Pattern::DigitAfter("windows 1", '1', '9'), WindowsVersion::Eleven),
    (Pattern::Literal("windows 10"), WindowsVersion::Ten),
    (Pattern::Literal("windows 8.1"), WindowsVersion::EightOne),
    (Pattern::Literal("windows 8"), WindowsVersion::Eight),
    (Pattern::Literal("windows 7"), WindowsVersion::Seven),
    (Pattern::Literal("windows vista"), WindowsVersion::Vista),
    (Pattern::Literal("windows xp"), WindowsVersion::Xp),
];

/// Infer the Windows release of `record`.
///
/// Boot images carry generic names ("Microsoft Windows Setup (x64)"), so a
/// boot record takes the version of the first install record in `all`.
pub fn infer_windows_version(
    record: &WimImageRecord,
    all: &[WimImageRecord],
) -> Result<WindowsVersion> {
    match record.kind {
        ImageKind::Boot => {
            let reference = all
                .iter()
                .find(|r| r.kind == ImageKind::Install)
                .ok_or_else(|| AppError::NoReferenceImage(record.path.clone()))?;
            infer_windows_version(reference, all)
        }
        ImageKind::Install => version_from_name(record.name()),
    }
}

pub fn version_from_name(name: &str) -> Result<WindowsVersion> {
    let lowered = name.to_ascii_lowercase();
    VERSION_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.matches(&lowered))
        .map(|(_, version)| *version)
        .ok_or_else(|| AppError::UnrecognizedVersion(name.to_string()))
}

pub fn to_driver_version(version: WindowsVersion) -> Result<DriverVersion> {
    match version {
        WindowsVersion::Eleven => Ok(DriverVersion::W11),
        WindowsVersion::Ten => Ok(DriverVersion::W10),
        WindowsVersion::EightOne => Ok(DriverVersion::W8_1),
        WindowsVersion::Eight => Ok(DriverVersion::W8),
        WindowsVersion::Seven => Ok(DriverVersion::W7),
        WindowsVersion::Vista | WindowsVersion::Xp => {
            Err(AppError::UnsupportedVersion(version.tag().to_string()))
        }
    }
}

pub fn architecture_of(record: &WimImageRecord) -> Result<Architecture> {
    Architecture::parse(record.architecture())
        .ok_or_else(|| AppError::UnsupportedArchitecture(record.architecture().to_string()))
}
