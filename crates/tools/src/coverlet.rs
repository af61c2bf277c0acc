//! Inline Coverage Tool Execution
//!
//! Builds the coverage tool's command line for one project and runs it with
//! the project's timeout.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use fine_coverage_core::{CoreError, CoreResult, CoverageProject};

use crate::installer::ToolInstaller;
use crate::process::{CommandRunner, FailureMode, ProcessRequest};

/// Trim stray quoting around a filter value. Each value is its own argv
/// entry, so embedded quotes reach the tool unchanged.
///
/// Returns `None` for values that are blank after trimming.
fn filter_value(value: &str, extra_trim: &[char]) -> Option<String> {
    let trimmed = value.trim_matches(|c: char| c == ' ' || c == '\'' || c == '"' || extra_trim.contains(&c));
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn push_filters(args: &mut Vec<String>, flag: &str, values: &[String], extra_trim: &[char]) {
    for value in values.iter().filter_map(|v| filter_value(v, extra_trim)) {
        args.push(flag.to_string());
        args.push(value);
    }
}

/// Arguments for running the coverage tool against `project`.
pub fn build_arguments(project: &CoverageProject) -> Vec<String> {
    let settings = &project.settings;
    let test_dll = project.test_dll_file.to_string_lossy().into_owned();
    let work_output = project.work_output_folder();

    let mut args = vec![test_dll.clone(), "--format".to_string(), "cobertura".to_string()];

    push_filters(&mut args, "--exclude", &settings.exclude, &[]);
    push_filters(&mut args, "--include", &settings.include, &[]);
    push_filters(&mut args, "--exclude-by-file", &settings.exclude_by_file, &[]);
    push_filters(&mut args, "--exclude-by-attribute", &settings.exclude_by_attribute, &['[', ']']);

    if settings.include_test_assembly {
        args.push("--include-test-assembly".to_string());
    }

    args.push("--target".to_string());
    args.push("dotnet".to_string());
    args.push("--output".to_string());
    args.push(project.cover_tool_output_file().to_string_lossy().into_owned());
    args.push("--targetargs".to_string());
    args.push(format!(
        "test \"{}\" --nologo --blame --results-directory \"{}\" --diag \"{}\"",
        test_dll,
        work_output.display(),
        work_output.join("diagnostics.log").display()
    ));
    args
}

/// Remove the previous output file and recreate an empty work folder.
async fn reset_output(project: &CoverageProject) -> CoreResult<()> {
    let output_file = project.cover_tool_output_file();
    if tokio::fs::try_exists(&output_file).await.unwrap_or(false) {
        tokio::fs::remove_file(&output_file).await?;
    }
    let work_output = project.work_output_folder();
    if tokio::fs::try_exists(&work_output).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&work_output).await?;
    }
    tokio::fs::create_dir_all(&work_output).await?;
    Ok(())
}

/// Runs the coverage tool for single projects.
pub struct CoverletRunner {
    runner: Arc<dyn CommandRunner>,
    installer: Arc<ToolInstaller>,
}

impl CoverletRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, installer: Arc<ToolInstaller>) -> Self {
        Self { runner, installer }
    }

    pub fn installer(&self) -> &Arc<ToolInstaller> {
        &self.installer
    }

    /// Run coverage for `project`.
    ///
    /// `Ok(true)` on success. In [`FailureMode::BestEffort`] timeouts and
    /// non-zero exits are logged and reported as `Ok(false)`; in
    /// [`FailureMode::Strict`] they are returned. Cancellation and a missing
    /// tool are always errors.
    pub async fn run(&self, project: &CoverageProject, mode: FailureMode, cancel: &CancellationToken) -> CoreResult<bool> {
        let executable = self.installer.executable_path().await?;
        let title = format!("Coverlet Run ({})", project.project_name());

        reset_output(project).await?;

        let working_directory = project.test_dll_directory();
        let request = ProcessRequest::new(executable, build_arguments(project), project.settings.cover_tool_timeout)
            .with_working_directory(if working_directory.as_os_str().is_empty() {
                Path::new(".")
            } else {
                working_directory
            });
        info!("[Coverlet] {} - Arguments: {}", title, request.args.join(" "));

        let failure = match self.runner.run(&request, cancel).await {
            Ok(output) if output.success() => {
                info!("[Coverlet] {} - Output\n{}", title, output.output.trim_end());
                return Ok(true);
            }
            Ok(output) => {
                warn!(
                    "[Coverlet] {} - Error (exit code {})\n{}",
                    title,
                    output.exit_code,
                    output.output.trim_end()
                );
                CoreError::ToolExecutionFailed {
                    exit_code: output.exit_code,
                    output: output.output,
                }
            }
            Err(e @ CoreError::ToolExecutionTimeout { .. }) => {
                error!("[Coverlet] {} - {}", title, e);
                e
            }
            Err(e) => return Err(e),
        };

        match mode {
            FailureMode::Strict => Err(failure),
            FailureMode::BestEffort => Ok(false),
        }
    }
}
