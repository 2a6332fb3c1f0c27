use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{Architecture, DriverComponent, DriverVersion};

/// The first level of `<root>/<component>/<version>/<arch>` that was absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSegment {
    Component,
    Version,
    Architecture,
}

impl fmt::Display for MissingSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingSegment::Component => "component",
            MissingSegment::Version => "version",
            MissingSegment::Architecture => "architecture",
        })
    }
}

/// Locate the driver directory of every component, in the order given.
pub fn resolve_driver_paths(
    payload_root: &Path,
    architecture: Architecture,
    version: DriverVersion,
    components: &[DriverComponent],
) -> Result<Vec<PathBuf>> {
    components
        .iter()
        .map(|component| resolve_component(payload_root, architecture, version, *component))
        .collect()
}

fn resolve_component(
    payload_root: &Path,
    architecture: Architecture,
    version: DriverVersion,
    component: DriverComponent,
) -> Result<PathBuf> {
    let component_dir = payload_root.join(component.dir_name());
    let version_dir = component_dir.join(version.dir_name());
    let arch_dir = version_dir.join(architecture.as_str());

    for (segment, path) in [
        (MissingSegment::Component, &component_dir),
        (MissingSegment::Version, &version_dir),
        (MissingSegment::Architecture, &arch_dir),
    ] {
        if !path.is_dir() {
            return Err(AppError::DriverNotFound {
                segment,
                path: path.clone(),
            });
        }
    }
    debug!("component={component} driver_dir={}", arch_dir.display());
    Ok(arch_dir)
}
