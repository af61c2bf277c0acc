//! Alternate Collector Coverage Service
//!
//! Collects coverage through the host test platform's built-in collector:
//! decides per run whether that strategy can be used, generates runsettings
//! for projects without any, injects settings into user runsettings when the
//! host asks, and hands the produced cobertura files to the engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use fine_coverage_core::{
    assign_output_folders, CoverageProject, ReportGenerator, RunSettingsRequestState, TestOperation,
};
use fine_coverage_runsettings::{analyse, ProjectRunSettingsGenerator, ReplacementSet, RunSettingsTemplate};
use fine_coverage_tools::{ensure_unzipped, ToolZipProvider};

use super::engine::{completion, CoverageEngine, Cycle};
use super::handoff::collect_coverage_files;
use super::lock;
use super::shim::ShimCopier;
use crate::utils::paths::{ms_shim_path, ms_test_adapter_path};

/// Outcome of deciding whether the alternate collector is used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Collecting,
    NotCollecting,
    Error,
}

#[derive(Default)]
struct RunState {
    /// Projects with user runsettings, keyed by test binary
    user_run_settings: HashMap<PathBuf, CoverageProject>,
    /// Test binary to the runsettings generated for it
    generated: HashMap<PathBuf, PathBuf>,
    generated_projects: Vec<CoverageProject>,
}

/// Archive name prefix of the alternate collector package.
pub const MS_CODE_COVERAGE_ZIP_PREFIX: &str = "microsoft.codecoverage";

/// Alternate collector collection strategy.
pub struct MsCodeCoverageService {
    tool_directory: PathBuf,
    tool_zips: Option<Arc<dyn ToolZipProvider>>,
    generator: Arc<ProjectRunSettingsGenerator>,
    engine: Arc<CoverageEngine>,
    shim: ShimCopier,
    state: Mutex<RunState>,
}

impl MsCodeCoverageService {
    /// `tool_directory` is the alternate collector's install folder.
    pub fn new(
        tool_directory: impl Into<PathBuf>,
        generator: Arc<ProjectRunSettingsGenerator>,
        engine: Arc<CoverageEngine>,
    ) -> Self {
        Self {
            tool_directory: tool_directory.into(),
            tool_zips: None,
            generator,
            engine,
            shim: ShimCopier,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Source of the collector package unzipped by [`Self::ensure_package`].
    pub fn with_tool_zips(mut self, provider: Arc<dyn ToolZipProvider>) -> Self {
        self.tool_zips = Some(provider);
        self
    }

    pub fn tool_directory(&self) -> &Path {
        &self.tool_directory
    }

    /// Whether the collector package (test adapter folder) is on disk.
    pub fn package_present(&self) -> bool {
        self.test_adapter().is_dir()
    }

    /// Unzip the newest collector package into the tool directory.
    ///
    /// Blocking; called once from the initialisation thread.
    pub fn ensure_package(&self) -> bool {
        let zip = match &self.tool_zips {
            Some(provider) => match provider.provide_zip(MS_CODE_COVERAGE_ZIP_PREFIX) {
                Ok(zip) => zip,
                Err(e) => {
                    error!("[MsCoverage] Could not look up the collector package: {}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(zip) = zip {
            if let Err(e) = ensure_unzipped(&self.tool_directory, &zip) {
                error!("[MsCoverage] Could not unzip {}: {}", zip.path.display(), e);
            }
        }

        let present = self.package_present();
        if !present {
            warn!(
                "[MsCoverage] Collector package missing from {}",
                self.tool_directory.display()
            );
        }
        present
    }

    fn report(&self) -> &Arc<dyn ReportGenerator> {
        self.engine.report_generator()
    }

    fn test_adapter(&self) -> PathBuf {
        ms_test_adapter_path(&self.tool_directory)
    }

    fn combined_log(&self, message: &str) {
        info!("[MsCoverage] {}", message);
        self.report().log_coverage_process(message);
    }

    fn combined_error(&self, message: &str) {
        error!("[MsCoverage] {}", message);
        self.report().log_coverage_process(message);
    }

    /// Decide whether this run collects with the alternate collector and
    /// prepare everything it needs.
    pub async fn is_collecting(
        &self,
        operation: &dyn TestOperation,
        mut projects: Vec<CoverageProject>,
        use_alternate_collector: bool,
    ) -> CollectionStatus {
        *lock(&self.state) = RunState::default();

        if !self.package_present() {
            warn!(
                "[MsCoverage] Collector package missing from {}, test adapter paths will not resolve",
                self.tool_directory.display()
            );
        }

        let analysis = analyse(&projects, use_alternate_collector, &self.tool_directory);
        if let Err(e) = analysis.ensure_suitable() {
            warn!("[MsCoverage] {}", e);
            self.combined_log("Run settings are unsuitable for ms code coverage");
            return CollectionStatus::NotCollecting;
        }

        let solution_directory = operation.solution_directory();
        assign_output_folders(&mut projects, solution_directory.as_deref());
        for project in &projects {
            if let Err(e) = project.prepare_for_coverage() {
                self.combined_error(&format!("Could not prepare {}: {}", project.project_name(), e));
                return CollectionStatus::Error;
            }
        }

        let (with_run_settings, without_run_settings): (Vec<_>, Vec<_>) =
            projects.into_iter().partition(|p| p.has_user_run_settings());

        {
            let mut state = lock(&self.state);
            state.user_run_settings = with_run_settings
                .iter()
                .map(|p| (p.test_dll_file.clone(), p.clone()))
                .collect();
        }

        let shim_path = ms_shim_path(&self.tool_directory);
        // Analysis ran on the unassigned projects; match them back by test binary.
        let with_alternate_adapter: Vec<CoverageProject> = with_run_settings
            .iter()
            .filter(|p| {
                analysis
                    .projects_with_alternate_adapter
                    .iter()
                    .any(|a| a.test_dll_file == p.test_dll_file)
            })
            .cloned()
            .collect();
        self.shim.copy(&shim_path, &with_alternate_adapter);

        if without_run_settings.is_empty() {
            self.combined_log("Ms code coverage with user runsettings");
            return CollectionStatus::Collecting;
        }

        if !(analysis.specified_alternate_collector || use_alternate_collector) {
            return CollectionStatus::NotCollecting;
        }

        match self
            .generate_projects_run_settings(&without_run_settings, solution_directory.as_deref(), &shim_path)
            .await
        {
            Ok(custom_template_paths) => {
                if !custom_template_paths.is_empty() {
                    let mut message = String::from("Ms code coverage - custom template paths");
                    for path in &custom_template_paths {
                        message.push('\n');
                        message.push_str(&path.to_string_lossy());
                    }
                    self.combined_log(&message);
                } else {
                    self.combined_log("Ms code coverage");
                }
                CollectionStatus::Collecting
            }
            Err(message) => {
                self.combined_error(&message);
                CollectionStatus::Error
            }
        }
    }

    /// Generate and write runsettings; on failure every file of the batch is
    /// removed again. Returns the custom template paths used.
    async fn generate_projects_run_settings(
        &self,
        projects: &[CoverageProject],
        solution_directory: Option<&Path>,
        shim_path: &Path,
    ) -> Result<Vec<PathBuf>, String> {
        let generated = self
            .generator
            .create_projects_run_settings(projects, solution_directory, &self.test_adapter())
            .map_err(|e| format!("Exception generating ms runsettings: {}", e))?;

        let replaced_adapter: Vec<CoverageProject> = generated
            .iter()
            .filter(|g| g.replaced_test_adapter)
            .map(|g| g.project.clone())
            .collect();
        self.shim.copy(shim_path, &replaced_adapter);

        if let Err(e) = self.generator.write_projects_run_settings(&generated).await {
            if let Err(cleanup) = self.generator.remove_generated_project_settings(projects).await {
                warn!("[MsCoverage] {}", cleanup);
            }
            return Err(format!("Exception writing ms runsettings: {}", e));
        }

        self.engine.register_generated(projects);
        let mut state = lock(&self.state);
        state.generated = generated
            .iter()
            .map(|g| (g.project.test_dll_file.clone(), g.path()))
            .collect();
        state.generated_projects = projects.to_vec();

        Ok(generated.into_iter().filter_map(|g| g.custom_template_path).collect())
    }

    /// Generated runsettings path for a test binary of the current run.
    pub fn generated_run_settings_for(&self, test_dll: &Path) -> Option<PathBuf> {
        lock(&self.state).generated.get(test_dll).cloned()
    }

    /// Host callback before it uses a runsettings document.
    ///
    /// Returns the document with collection settings injected, or `None`
    /// when nothing should change.
    pub fn add_run_settings(
        &self,
        document: &str,
        request_state: RunSettingsRequestState,
        test_containers: &[PathBuf],
    ) -> Option<String> {
        if request_state != RunSettingsRequestState::Execution {
            return None;
        }
        if RunSettingsTemplate::fcc_generated(document) {
            return None;
        }

        let replacements = {
            let state = lock(&self.state);
            ReplacementSet::for_test_containers(test_containers, &state.user_run_settings, &self.test_adapter())
        };
        match self.generator.template().add_fcc_run_settings(document, &replacements) {
            Ok(injected) => Some(injected),
            Err(e) => {
                self.combined_error(&format!("Could not add ms runsettings: {}", e));
                None
            }
        }
    }

    /// Report the run's coverage; generated runsettings are removed once the
    /// report is done.
    pub fn collect(&self, operation: &dyn TestOperation, cycle: &Cycle) {
        let files = collect_coverage_files(&operation.result_uris(), self.report().as_ref());

        let projects = std::mem::take(&mut lock(&self.state).generated_projects);
        let generator = self.generator.clone();
        self.engine.run_report(
            cycle,
            files,
            Some(completion(move || async move {
                if let Err(e) = generator.remove_generated_project_settings(&projects).await {
                    warn!("[MsCoverage] {}", e);
                }
            })),
        );
    }

    pub fn stop_coverage(&self) {
        self.engine.stop_coverage();
    }
}
