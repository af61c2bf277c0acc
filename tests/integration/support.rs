//! Fake collaborators shared by the integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fine_coverage::{AppOptions, CoverageContext};
use fine_coverage_core::{CoreError, CoreResult, CoverageProject, ReportGenerator, ReportResult, TestOperation};
use fine_coverage_tools::{CommandRunner, ProcessOutput, ProcessRequest};

// ============================================================================
// Test operation
// ============================================================================

#[derive(Default)]
pub struct FakeOperation {
    pub total: Option<u64>,
    pub failed: Option<u64>,
    pub solution: Option<PathBuf>,
    pub projects: Vec<CoverageProject>,
    pub result_uris: Vec<String>,
}

#[async_trait]
impl TestOperation for FakeOperation {
    fn total_tests(&self) -> Option<u64> {
        self.total
    }

    fn failed_tests(&self) -> Option<u64> {
        self.failed
    }

    fn solution_directory(&self) -> Option<PathBuf> {
        self.solution.clone()
    }

    fn result_uris(&self) -> Vec<String> {
        self.result_uris.clone()
    }

    async fn get_coverage_projects(&self) -> CoreResult<Vec<CoverageProject>> {
        Ok(self.projects.clone())
    }
}

// ============================================================================
// Report generator
// ============================================================================

#[derive(Default)]
pub struct RecordingReport {
    pub reports: Mutex<Vec<Vec<PathBuf>>>,
    pub messages: Mutex<Vec<String>>,
}

impl RecordingReport {
    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn last_files(&self) -> Option<Vec<PathBuf>> {
        self.reports.lock().unwrap().last().cloned()
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl ReportGenerator for RecordingReport {
    async fn generate(&self, coverage_files: &[PathBuf], output_folder: &Path) -> CoreResult<ReportResult> {
        self.reports.lock().unwrap().push(coverage_files.to_vec());
        Ok(ReportResult {
            success: true,
            unified_html: Some(output_folder.join("index.html")),
            unified_xml_file: Some(output_folder.join("Cobertura.xml")),
        })
    }

    fn log_coverage_process(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Tool runner
// ============================================================================

/// Answers `dotnet tool list` with an installed coverage tool and runs the
/// coverage tool by writing its `--output` file.
#[derive(Default)]
pub struct FakeTool {
    pub coverage_runs: AtomicUsize,
    /// Coverage tool runs block until cancelled
    pub hang: bool,
}

#[async_trait]
impl CommandRunner for FakeTool {
    async fn run(&self, request: &ProcessRequest, cancel: &CancellationToken) -> CoreResult<ProcessOutput> {
        if request.executable == Path::new("dotnet") {
            return Ok(ProcessOutput {
                exit_code: 0,
                output: "Package Id          Version      Commands\n-----------------------------------------\ncoverlet.console    1.7.2        coverlet\n".to_string(),
            });
        }

        self.coverage_runs.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            cancel.cancelled().await;
            return Err(CoreError::cancelled("coverage run cancelled"));
        }

        let output = request
            .args
            .iter()
            .position(|a| a == "--output")
            .and_then(|i| request.args.get(i + 1))
            .ok_or_else(|| CoreError::command("missing --output"))?;
        std::fs::write(output, "<coverage/>")?;
        Ok(ProcessOutput {
            exit_code: 0,
            output: "Calculating coverage result...".to_string(),
        })
    }
}

// ============================================================================
// Context
// ============================================================================

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub context: CoverageContext,
    pub report: Arc<RecordingReport>,
    pub tool: Arc<FakeTool>,
}

impl Harness {
    pub async fn new(options: AppOptions) -> Self {
        Self::with_tool(options, FakeTool::default()).await
    }

    pub async fn with_tool(options: AppOptions, tool: FakeTool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let app_data = dir.path().join("appdata");
        let report = Arc::new(RecordingReport::default());
        let tool = Arc::new(tool);

        let context = CoverageContext::new(&app_data, Arc::new(options), report.clone(), tool.clone()).unwrap();

        // executable the installer resolves after the version query
        std::fs::create_dir_all(context.installer().tool_directory()).unwrap();
        std::fs::write(context.installer().tool_directory().join("coverlet"), "").unwrap();
        context.installer().ensure_ready().await.unwrap();

        Self {
            dir,
            context,
            report,
            tool,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A project `<root>/<name>/<name>.csproj` with a built test binary.
    pub fn project(&self, name: &str) -> CoverageProject {
        let project_dir = self.root().join(name);
        let bin = project_dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let dll = bin.join(format!("{}.dll", name));
        std::fs::write(&dll, "").unwrap();
        CoverageProject::new(project_dir.join(format!("{}.csproj", name)), dll)
    }

    pub fn write_user_run_settings(&self, project: CoverageProject, content: &str) -> CoverageProject {
        let path = project.project_directory().join("user.runsettings");
        std::fs::write(&path, content).unwrap();
        project.with_run_settings_file(path)
    }

    /// Wait until `condition` holds, polling for up to five seconds.
    pub async fn eventually(&self, condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        condition()
    }
}
