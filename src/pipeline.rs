//! Driver injection across every image of an extracted setup tree.
//!
//! The run is planned completely (metadata of both WIM files, versions,
//! driver directories) before the first image is mounted, so an input error
//! on any image leaves every WIM file untouched. After that, images are
//! serviced one at a time and the first failure ends the run.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::context::Context;
use crate::dism::{read_images, ImagingTool};
use crate::drivers::resolve_driver_paths;
use crate::error::{Disposition, Result};
use crate::models::{
    Architecture, Channel, DriverComponent, DriverVersion, ImageKind, WimImageRecord,
    WindowsVersion,
};
use crate::mount::{inject_drivers, InjectionSummary};
use crate::payload::DriverPayload;
use crate::version::{architecture_of, infer_windows_version, to_driver_version};

/// Processing order: boot images first.
const WIM_KINDS: [ImageKind; 2] = [ImageKind::Boot, ImageKind::Install];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct SkippedWim {
    pub path: PathBuf,
    pub kind: ImageKind,
    pub reason: SkipReason,
}

/// Outcome of looking at one well-known WIM file. Fatal problems are `Err`.
#[derive(Debug, Clone)]
pub enum WimDiscovery {
    Found(Vec<WimImageRecord>),
    Skipped(SkippedWim),
}

#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub record: WimImageRecord,
    pub version: WindowsVersion,
    pub driver_version: DriverVersion,
    pub architecture: Architecture,
    pub drivers: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub plan: ImagePlan,
    pub summary: InjectionSummary,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub skipped: Vec<SkippedWim>,
    pub images: Vec<ImageOutcome>,
}

pub fn wim_path(extracted_root: &Path, kind: ImageKind) -> PathBuf {
    extracted_root.join("sources").join(kind.wim_file_name())
}

/// Read the images of one WIM file, turning a missing or unreadable file
/// into a skip.
pub fn discover_wim(tool: &dyn ImagingTool, path: &Path, kind: ImageKind) -> Result<WimDiscovery> {
    if !path.is_file() {
        info!("{} not present, skipping", path.display());
        return Ok(WimDiscovery::Skipped(SkippedWim {
            path: path.to_path_buf(),
            kind,
            reason: SkipReason::Missing,
        }));
    }
    match read_images(tool, path) {
        Ok(mut images) => {
            images.sort_by_key(|i| i.index);
            Ok(WimDiscovery::Found(
                images
                    .into_iter()
                    .map(|info| WimImageRecord::new(info, path, kind))
                    .collect(),
            ))
        }
        Err(err) if err.disposition() == Disposition::Skip => {
            warn!("skipping {}: {err}", path.display());
            Ok(WimDiscovery::Skipped(SkippedWim {
                path: path.to_path_buf(),
                kind,
                reason: SkipReason::Unreadable,
            }))
        }
        Err(err) => Err(err),
    }
}

/// Every image record under `extracted_root`, boot images first.
pub fn collect_records(
    tool: &dyn ImagingTool,
    extracted_root: &Path,
) -> Result<(Vec<WimImageRecord>, Vec<SkippedWim>)> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for kind in WIM_KINDS {
        match discover_wim(tool, &wim_path(extracted_root, kind), kind)? {
            WimDiscovery::Found(found) => records.extend(found),
            WimDiscovery::Skipped(skip) => skipped.push(skip),
        }
    }
    Ok((records, skipped))
}

/// Windows version, driver tag and architecture for every record.
fn plan_versions(
    records: &[WimImageRecord],
) -> Result<Vec<(WindowsVersion, DriverVersion, Architecture)>> {
    records
        .iter()
        .map(|record| {
            let version = infer_windows_version(record, records)?;
            let driver_version = to_driver_version(version)?;
            let architecture = architecture_of(record)?;
            info!(
                "{} image {} ({}): Windows {version}, drivers {driver_version}/{architecture}",
                record.kind,
                record.index(),
                record.name()
            );
            Ok((version, driver_version, architecture))
        })
        .collect()
}

/// Inject the VirtIO storage, SCSI and network drivers into every boot and
/// install image under `extracted_root`.
pub fn add_virtio_drivers(
    ctx: &Context,
    tool: &dyn ImagingTool,
    payload: &dyn DriverPayload,
    extracted_root: &Path,
    channel: Channel,
) -> Result<PipelineReport> {
    let (records, skipped) = collect_records(tool, extracted_root)?;
    let mut report = PipelineReport {
        skipped,
        images: Vec::new(),
    };
    if records.is_empty() {
        warn!("no WIM images found under {}", extracted_root.display());
        return Ok(report);
    }

    let versions = plan_versions(&records)?;
    let payload_root = payload.payload_root(channel)?;
    let plans = records
        .into_iter()
        .zip(versions)
        .map(|(record, (version, driver_version, architecture))| {
            let drivers = resolve_driver_paths(
                &payload_root,
                architecture,
                driver_version,
                &DriverComponent::ALL,
            )?;
            Ok(ImagePlan {
                record,
                version,
                driver_version,
                architecture,
                drivers,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for plan in plans {
        let summary = inject_drivers(
            ctx,
            tool,
            &plan.record.path,
            &plan.drivers,
            plan.record.index(),
            plan.record.kind,
        )?;
        report.images.push(ImageOutcome { plan, summary });
    }
    info!(
        "VirtIO drivers injected into {} image(s) under {}",
        report.images.len(),
        extracted_root.display()
    );
    Ok(report)
}
