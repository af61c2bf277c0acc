//! Custom Template Discovery
//!
//! A project directory's custom template wins over the solution's, which wins
//! over the built-in template.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use fine_coverage_core::CoreResult;

/// File name looked up in project and solution directories.
pub const CUSTOM_TEMPLATE_FILE_NAME: &str = "fcc-ms-runsettings-template.xml";

/// A custom template found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTemplateDetails {
    pub path: PathBuf,
    pub template: String,
}

/// Source of custom templates.
pub trait CustomTemplateProvider: Send + Sync {
    fn provide(
        &self,
        project_directory: &Path,
        solution_directory: Option<&Path>,
    ) -> CoreResult<Option<CustomTemplateDetails>>;
}

/// Looks for [`CUSTOM_TEMPLATE_FILE_NAME`] on disk.
#[derive(Debug, Clone, Default)]
pub struct FileCustomTemplateProvider;

impl FileCustomTemplateProvider {
    fn read_if_exists(directory: &Path) -> CoreResult<Option<CustomTemplateDetails>> {
        let path = directory.join(CUSTOM_TEMPLATE_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let template = std::fs::read_to_string(&path)?;
        debug!("[RunSettings] Using custom template {}", path.display());
        Ok(Some(CustomTemplateDetails { path, template }))
    }
}

impl CustomTemplateProvider for FileCustomTemplateProvider {
    fn provide(
        &self,
        project_directory: &Path,
        solution_directory: Option<&Path>,
    ) -> CoreResult<Option<CustomTemplateDetails>> {
        if let Some(details) = Self::read_if_exists(project_directory)? {
            return Ok(Some(details));
        }
        match solution_directory {
            Some(dir) => Self::read_if_exists(dir),
            None => Ok(None),
        }
    }
}
