//! Shim Copier
//!
//! Copies the alternate collector's compatibility adapter next to the test
//! binaries of projects whose runsettings swap in that adapter.

use std::path::Path;

use tracing::{debug, error, info};

use fine_coverage_core::CoverageProject;

/// Copies the shim binary beside test binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShimCopier;

impl ShimCopier {
    /// Copy `shim_path` into each project's test binary directory when it is
    /// not there yet. Returns the number of files copied.
    pub fn copy(&self, shim_path: &Path, projects: &[CoverageProject]) -> usize {
        let Some(file_name) = shim_path.file_name() else {
            error!("[Shim] Invalid shim path {}", shim_path.display());
            return 0;
        };

        let mut copied = 0;
        for project in projects {
            let destination = project.test_dll_directory().join(file_name);
            if destination.exists() {
                debug!("[Shim] {} already present", destination.display());
                continue;
            }
            match std::fs::copy(shim_path, &destination) {
                Ok(_) => {
                    info!("[Shim] Copied shim for {}", project.project_name());
                    copied += 1;
                }
                Err(e) => error!(
                    "[Shim] Failed to copy shim for {} to {}: {}",
                    project.project_name(),
                    destination.display(),
                    e
                ),
            }
        }
        copied
    }
}
