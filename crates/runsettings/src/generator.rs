//! Per-Project RunSettings Generation
//!
//! Builds runsettings for projects that have none, writes them beside each
//! project's coverage output, and removes them again once the run's report
//! has been produced.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fine_coverage_core::{CoreError, CoreResult, CoverageProject};

use crate::custom::{CustomTemplateProvider, FileCustomTemplateProvider};
use crate::replacements::ReplacementSet;
use crate::template::RunSettingsTemplate;

/// Generated runsettings for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRunSettings {
    pub project: CoverageProject,
    pub run_settings: String,
    /// Custom template used, if any
    pub custom_template_path: Option<PathBuf>,
    pub replaced_test_adapter: bool,
}

impl ProjectRunSettings {
    /// Where this project's generated runsettings are written.
    pub fn path(&self) -> PathBuf {
        self.project.generated_run_settings_file()
    }
}

/// Generates, writes, and removes per-project runsettings.
pub struct ProjectRunSettingsGenerator {
    template: RunSettingsTemplate,
    custom_templates: Arc<dyn CustomTemplateProvider>,
}

impl ProjectRunSettingsGenerator {
    pub fn new(template: RunSettingsTemplate) -> Self {
        Self {
            template,
            custom_templates: Arc::new(FileCustomTemplateProvider),
        }
    }

    pub fn template(&self) -> &RunSettingsTemplate {
        &self.template
    }

    /// Resolve the template for a project: custom (configured) or built-in.
    pub fn resolve_template(
        &self,
        project_directory: &Path,
        solution_directory: Option<&Path>,
    ) -> CoreResult<(String, Option<PathBuf>)> {
        match self.custom_templates.provide(project_directory, solution_directory)? {
            Some(details) => {
                let configured = self.template.configure_custom(&details.template)?;
                Ok((configured, Some(details.path)))
            }
            None => Ok((self.template.template().to_string(), None)),
        }
    }

    /// Generate runsettings for one project.
    pub fn create_project_run_settings(
        &self,
        project: &CoverageProject,
        solution_directory: Option<&Path>,
        test_adapter: &Path,
    ) -> CoreResult<ProjectRunSettings> {
        let (template, custom_template_path) =
            self.resolve_template(project.project_directory(), solution_directory)?;
        let replacements = ReplacementSet::for_project(project, test_adapter);
        let result = self.template.generate(&template, &replacements).map_err(|e| {
            CoreError::template(format!("{}: {}", project.project_name(), e))
        })?;

        Ok(ProjectRunSettings {
            project: project.clone(),
            run_settings: result.replaced,
            custom_template_path,
            replaced_test_adapter: result.replaced_test_adapter,
        })
    }

    /// Generate runsettings for every project; the first failure aborts.
    pub fn create_projects_run_settings(
        &self,
        projects: &[CoverageProject],
        solution_directory: Option<&Path>,
        test_adapter: &Path,
    ) -> CoreResult<Vec<ProjectRunSettings>> {
        projects
            .iter()
            .map(|project| self.create_project_run_settings(project, solution_directory, test_adapter))
            .collect()
    }

    /// Write every generated file. Returns the written paths in order.
    pub async fn write_projects_run_settings(
        &self,
        projects_run_settings: &[ProjectRunSettings],
    ) -> CoreResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(projects_run_settings.len());
        for project_run_settings in projects_run_settings {
            let path = project_run_settings.path();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &project_run_settings.run_settings).await?;
            info!(
                "[RunSettings] Wrote generated runsettings for {} to {}",
                project_run_settings.project.project_name(),
                path.display()
            );
            written.push(path);
        }
        Ok(written)
    }

    /// Remove generated runsettings of `projects`. Missing files are fine;
    /// every removal is attempted before the first failure is reported.
    pub async fn remove_generated_project_settings(&self, projects: &[CoverageProject]) -> CoreResult<()> {
        let mut failures = Vec::new();
        for project in projects {
            let path = project.generated_run_settings_file();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("[RunSettings] Removed generated runsettings {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("[RunSettings] Failed to remove {}: {}", path.display(), e);
                    failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::cleanup(failures.join("; ")))
        }
    }
}
