//! Coverage Engine
//!
//! Owns the single in-flight coverage cycle. A new cycle always supersedes
//! the previous one: the old cycle is cancelled and awaited, generated
//! runsettings it left behind are removed, and only then does the new cycle
//! get a fresh cancellation token and generation number. Results are
//! published only while their generation is still current.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fine_coverage_core::{CoreError, CoverageProject, ReportGenerator, ReportResult};
use fine_coverage_runsettings::ProjectRunSettingsGenerator;
use fine_coverage_tools::{CoverletRunner, FailureMode};

use super::lock;

/// Work run once the unified report has been produced.
pub type CompletionCallback = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Box an async closure as a [`CompletionCallback`].
pub fn completion<F, Fut>(f: F) -> CompletionCallback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(f()) })
}

/// Handle on one coverage cycle.
#[derive(Debug, Clone)]
pub struct Cycle {
    generation: u64,
    token: CancellationToken,
}

impl Cycle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Default)]
struct ActiveCycle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Shared pieces a cycle task needs after the engine call returns.
#[derive(Clone)]
struct CycleContext {
    coverlet: Arc<CoverletRunner>,
    report: Arc<dyn ReportGenerator>,
    report_folder: PathBuf,
    generation: Arc<AtomicU64>,
    last_report: Arc<Mutex<Option<ReportResult>>>,
    pending_cleanup: Arc<Mutex<Vec<CoverageProject>>>,
}

/// Runs coverage cycles one at a time.
pub struct CoverageEngine {
    ctx: CycleContext,
    generator: Arc<ProjectRunSettingsGenerator>,
    active: Mutex<ActiveCycle>,
}

impl CoverageEngine {
    pub fn new(
        coverlet: Arc<CoverletRunner>,
        report: Arc<dyn ReportGenerator>,
        generator: Arc<ProjectRunSettingsGenerator>,
        report_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ctx: CycleContext {
                coverlet,
                report,
                report_folder: report_folder.into(),
                generation: Arc::new(AtomicU64::new(0)),
                last_report: Arc::new(Mutex::new(None)),
                pending_cleanup: Arc::new(Mutex::new(Vec::new())),
            },
            generator,
            active: Mutex::new(ActiveCycle::default()),
        }
    }

    pub fn report_generator(&self) -> &Arc<dyn ReportGenerator> {
        &self.ctx.report
    }

    pub fn coverlet(&self) -> &Arc<CoverletRunner> {
        &self.ctx.coverlet
    }

    /// Latest report published by a cycle that was still current.
    pub fn last_report(&self) -> Option<ReportResult> {
        lock(&self.ctx.last_report).clone()
    }

    /// Whether `generation` is the newest cycle.
    pub fn is_current(&self, generation: u64) -> bool {
        self.ctx.generation.load(Ordering::SeqCst) == generation
    }

    /// Supersede the active cycle and start a new one.
    pub async fn begin_cycle(&self) -> Cycle {
        let previous = {
            let mut active = lock(&self.active);
            active.token.cancel();
            active.handle.take()
        };
        if let Some(handle) = previous {
            if let Err(e) = handle.await {
                error!("[Engine] Previous coverage cycle ended abnormally: {}", e);
            }
        }

        self.cleanup_pending().await;

        let token = CancellationToken::new();
        let generation = self.ctx.generation.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.active).token = token.clone();
        info!("[Engine] Coverage cycle {} started", generation);
        Cycle { generation, token }
    }

    /// Cancel the active cycle, if any.
    pub fn stop_coverage(&self) {
        let active = lock(&self.active);
        if !active.token.is_cancelled() {
            info!("[Engine] Stopping coverage");
            active.token.cancel();
        }
    }

    /// Wait for the active cycle's task to finish.
    pub async fn wait_idle(&self) {
        let handle = lock(&self.active).handle.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("[Engine] Coverage cycle ended abnormally: {}", e);
            }
        }
    }

    /// Remember generated runsettings so a superseded cycle's files are
    /// removed before the next cycle starts.
    pub fn register_generated(&self, projects: &[CoverageProject]) {
        lock(&self.ctx.pending_cleanup).extend(projects.iter().cloned());
    }

    async fn cleanup_pending(&self) {
        let pending = std::mem::take(&mut *lock(&self.ctx.pending_cleanup));
        if pending.is_empty() {
            return;
        }
        if let Err(e) = self.generator.remove_generated_project_settings(&pending).await {
            warn!("[Engine] {}", e);
        }
    }

    /// Supersede any active cycle and run the coverage tool for `projects`.
    pub async fn try_reload_coverage(&self, projects: Vec<CoverageProject>) -> Cycle {
        let cycle = self.begin_cycle().await;
        self.run_inline(&cycle, projects);
        cycle
    }

    /// Supersede any active cycle and report on existing coverage files.
    pub async fn run_and_process_report(
        &self,
        coverage_files: Vec<PathBuf>,
        on_complete: Option<CompletionCallback>,
    ) -> Cycle {
        let cycle = self.begin_cycle().await;
        self.run_report(&cycle, coverage_files, on_complete);
        cycle
    }

    /// Run the coverage tool for every enabled project, then report.
    pub fn run_inline(&self, cycle: &Cycle, projects: Vec<CoverageProject>) {
        let ctx = self.ctx.clone();
        let cycle_ref = cycle.clone();
        let task = tokio::spawn(async move {
            let Some(files) = ctx.run_tool(&projects, cycle_ref.token()).await else {
                return;
            };
            ctx.report_and_publish(&cycle_ref, files, None).await;
        });
        self.track(cycle, task);
    }

    /// Report on `coverage_files` produced outside the engine.
    pub fn run_report(&self, cycle: &Cycle, coverage_files: Vec<PathBuf>, on_complete: Option<CompletionCallback>) {
        let ctx = self.ctx.clone();
        let cycle_ref = cycle.clone();
        let task = tokio::spawn(async move {
            ctx.report_and_publish(&cycle_ref, coverage_files, on_complete).await;
        });
        self.track(cycle, task);
    }

    fn track(&self, cycle: &Cycle, task: JoinHandle<()>) {
        let mut active = lock(&self.active);
        if self.is_current(cycle.generation) {
            active.handle = Some(task);
        }
    }
}

impl CycleContext {
    /// Returns the output files, or `None` when the cycle must end without
    /// a report.
    async fn run_tool(&self, projects: &[CoverageProject], token: &CancellationToken) -> Option<Vec<PathBuf>> {
        let mut files = Vec::new();
        for project in projects.iter().filter(|p| p.settings.enabled) {
            if token.is_cancelled() {
                info!("[Engine] Coverage cancelled");
                return None;
            }
            if let Err(e) = project.prepare_for_coverage() {
                error!("[Engine] Could not prepare {}: {}", project.project_name(), e);
                continue;
            }
            match self.coverlet.run(project, FailureMode::BestEffort, token).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("[Engine] Coverage for {} failed, see log", project.project_name());
                }
                Err(CoreError::Cancelled(_)) => {
                    info!("[Engine] Coverage cancelled while running {}", project.project_name());
                    return None;
                }
                Err(e) => {
                    error!("[Engine] {}", e);
                    self.report.log_coverage_process(&e.to_string());
                    return None;
                }
            }
            let output = project.cover_tool_output_file();
            if output.exists() {
                files.push(output);
            }
        }
        Some(files)
    }

    async fn report_and_publish(&self, cycle: &Cycle, files: Vec<PathBuf>, on_complete: Option<CompletionCallback>) {
        if let Err(e) = tokio::fs::create_dir_all(&self.report_folder).await {
            error!("[Engine] Could not create report folder {}: {}", self.report_folder.display(), e);
            return;
        }

        let result = tokio::select! {
            result = self.report.generate(&files, &self.report_folder) => result,
            _ = cycle.token.cancelled() => {
                info!("[Engine] Report generation cancelled");
                return;
            }
        };

        match result {
            Ok(report) if !report.success => {
                warn!("[Engine] Report generation was not successful");
            }
            Ok(report) => {
                if self.generation.load(Ordering::SeqCst) == cycle.generation && !cycle.token.is_cancelled() {
                    info!("[Engine] Coverage cycle {} reported {} file(s)", cycle.generation, files.len());
                    *lock(&self.last_report) = Some(report);
                } else {
                    info!("[Engine] Discarding report of superseded cycle {}", cycle.generation);
                }
            }
            Err(e) => error!("[Engine] Report generation failed: {}", e),
        }

        if let Some(on_complete) = on_complete {
            lock(&self.pending_cleanup).clear();
            on_complete().await;
        }
    }
}
