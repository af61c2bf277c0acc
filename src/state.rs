//! Coverage Context
//!
//! Process-scoped context built once at startup. Every service receives its
//! collaborators from here; nothing is reached through global state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fine_coverage_core::ReportGenerator;
use fine_coverage_runsettings::{ProjectRunSettingsGenerator, RunSettingsTemplate};
use fine_coverage_tools::{CommandRunner, CoverletRunner, ToolInstaller, ToolZipProvider};

use crate::services::{initialize, CoverageEngine, EventSink, LifecycleCoordinator, MsCodeCoverageService, TestEventSource};
use crate::storage::config::OptionsProvider;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{coverlet_dir, ensure_dir, ms_code_coverage_dir, reports_dir};

/// Wired set of coverage services.
pub struct CoverageContext {
    app_data: PathBuf,
    options: Arc<dyn OptionsProvider>,
    installer: Arc<ToolInstaller>,
    generator: Arc<ProjectRunSettingsGenerator>,
    engine: Arc<CoverageEngine>,
    ms_coverage: Arc<MsCodeCoverageService>,
}

impl CoverageContext {
    /// Build every service under `app_data`.
    pub fn new(
        app_data: impl Into<PathBuf>,
        options: Arc<dyn OptionsProvider>,
        report: Arc<dyn ReportGenerator>,
        runner: Arc<dyn CommandRunner>,
    ) -> AppResult<Self> {
        let app_data = app_data.into();
        ensure_dir(&app_data)?;

        let installer = Arc::new(ToolInstaller::coverlet(runner.clone(), coverlet_dir(&app_data))?);
        let coverlet = Arc::new(CoverletRunner::new(runner, installer.clone()));
        let generator = Arc::new(ProjectRunSettingsGenerator::new(RunSettingsTemplate::new()?));
        let engine = Arc::new(CoverageEngine::new(
            coverlet,
            report,
            generator.clone(),
            reports_dir(&app_data),
        ));
        let ms_coverage = Arc::new(MsCodeCoverageService::new(
            ms_code_coverage_dir(&app_data),
            generator.clone(),
            engine.clone(),
        ));

        info!("[Context] Coverage services ready in {}", app_data.display());
        Ok(Self {
            app_data,
            options,
            installer,
            generator,
            engine,
            ms_coverage,
        })
    }

    /// Unzip the alternate collector package from `provider` during start-up.
    pub fn with_tool_zips(mut self, provider: Arc<dyn ToolZipProvider>) -> Self {
        self.ms_coverage = Arc::new(
            MsCodeCoverageService::new(
                ms_code_coverage_dir(&self.app_data),
                self.generator.clone(),
                self.engine.clone(),
            )
            .with_tool_zips(provider),
        );
        self
    }

    pub fn app_data(&self) -> &Path {
        &self.app_data
    }

    pub fn options(&self) -> &Arc<dyn OptionsProvider> {
        &self.options
    }

    pub fn installer(&self) -> &Arc<ToolInstaller> {
        &self.installer
    }

    pub fn generator(&self) -> &Arc<ProjectRunSettingsGenerator> {
        &self.generator
    }

    pub fn engine(&self) -> &Arc<CoverageEngine> {
        &self.engine
    }

    pub fn ms_coverage(&self) -> &Arc<MsCodeCoverageService> {
        &self.ms_coverage
    }

    /// A coordinator over this context's services.
    pub fn coordinator(&self) -> LifecycleCoordinator {
        LifecycleCoordinator::new(self.options.clone(), self.engine.clone(), self.ms_coverage.clone())
    }

    /// Start the coordinator loop and the initialisation thread that
    /// subscribes `source` once the environment is ready.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        source: Arc<dyn TestEventSource>,
        shutdown: CancellationToken,
    ) -> AppResult<(EventSink, JoinHandle<()>, std::thread::JoinHandle<()>)> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::internal(format!("No tokio runtime: {}", e)))?;
        let (sink, coordinator) = self.coordinator().start(shutdown);
        let init = initialize(
            source,
            self.installer.clone(),
            self.ms_coverage.clone(),
            sink.clone(),
            runtime,
        )?;
        Ok((sink, coordinator, init))
    }
}
