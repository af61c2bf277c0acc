//! Bundled Tool Packages
//!
//! Some tools ship as zip archives named `<prefix>.<version>.zip`. A package
//! is unzipped once into a fixed folder; a `.version` file records which
//! archive the folder holds so a newer archive replaces it.

use std::fs::File;
use std::path::{Path, PathBuf};

use semver::Version;
use tracing::{debug, info, warn};

use fine_coverage_core::{CoreError, CoreResult};

/// Marker written into an unzipped package folder.
pub const VERSION_MARKER: &str = ".version";

/// A versioned package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolZip {
    pub path: PathBuf,
    pub version: String,
}

/// Source of package archives.
pub trait ToolZipProvider: Send + Sync {
    /// Newest archive for `prefix`, if any.
    fn provide_zip(&self, prefix: &str) -> CoreResult<Option<ToolZip>>;
}

/// Finds `<prefix>.<version>.zip` files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryZipProvider {
    directory: PathBuf,
}

impl DirectoryZipProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl ToolZipProvider for DirectoryZipProvider {
    fn provide_zip(&self, prefix: &str) -> CoreResult<Option<ToolZip>> {
        if !self.directory.is_dir() {
            return Ok(None);
        }

        let mut newest: Option<(Version, ToolZip)> = None;
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(version) = name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|rest| rest.strip_suffix(".zip"))
            else {
                continue;
            };
            let Ok(parsed) = Version::parse(version) else {
                debug!("[Package] Ignoring {} with unparsable version", name);
                continue;
            };
            if newest.as_ref().map_or(true, |(v, _)| parsed > *v) {
                let zip = ToolZip {
                    path: path.clone(),
                    version: version.to_string(),
                };
                newest = Some((parsed, zip));
            }
        }
        Ok(newest.map(|(_, zip)| zip))
    }
}

/// Version recorded in an unzipped package folder.
pub fn installed_version(destination: &Path) -> Option<String> {
    std::fs::read_to_string(destination.join(VERSION_MARKER))
        .ok()
        .map(|v| v.trim().to_string())
}

/// Unzip `zip` into `destination` unless it already holds that version.
///
/// Extraction goes to a sibling folder first so an interrupted unzip never
/// leaves a half-populated package behind.
pub fn ensure_unzipped(destination: &Path, zip: &ToolZip) -> CoreResult<PathBuf> {
    if installed_version(destination).as_deref() == Some(zip.version.as_str()) {
        debug!("[Package] {} already holds {}", destination.display(), zip.version);
        return Ok(destination.to_path_buf());
    }

    let staging = destination.with_extension("partial");
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let file = File::open(&zip.path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::command(format!("Failed to read {}: {}", zip.path.display(), e)))?;
    archive
        .extract(&staging)
        .map_err(|e| CoreError::command(format!("Failed to unzip {}: {}", zip.path.display(), e)))?;
    std::fs::write(staging.join(VERSION_MARKER), &zip.version)?;

    if destination.exists() {
        warn!("[Package] Replacing {} with {}", destination.display(), zip.version);
        std::fs::remove_dir_all(destination)?;
    }
    std::fs::rename(&staging, destination)?;
    info!("[Package] Unzipped {} to {}", zip.path.display(), destination.display());
    Ok(destination.to_path_buf())
}
