//! Fine Coverage Command Line Interface
//!
//! # Commands
//!
//! - `fine-coverage ensure-tool` - Install or update the coverage tool
//! - `fine-coverage ensure-package` - Unzip the alternate collector package
//! - `fine-coverage runsettings` - Print generated runsettings for a project
//! - `fine-coverage run` - Run the coverage tool for one project

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use fine_coverage::utils::paths::{app_data_dir, coverlet_dir, ms_code_coverage_dir, ms_test_adapter_path};
use fine_coverage::{init_tracing, ConfigService, MS_CODE_COVERAGE_ZIP_PREFIX};
use fine_coverage_core::{assign_output_folders, CoverageProject};
use fine_coverage_runsettings::{ProjectRunSettingsGenerator, RunSettingsTemplate};
use fine_coverage_tools::{
    ensure_unzipped, CommandRunner, CoverletRunner, DirectoryZipProvider, FailureMode, ProcessRunner, ToolInstaller,
    ToolZipProvider,
};

/// Coverage orchestration for test runs
#[derive(Parser)]
#[command(name = "fine-coverage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// App-data folder (defaults to the per-user local data folder)
    #[arg(long, global = true)]
    app_data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update the coverage tool
    EnsureTool,

    /// Unzip the alternate collector package into app data
    EnsurePackage {
        /// Folder holding `microsoft.codecoverage.<version>.zip`
        zips_dir: PathBuf,
    },

    /// Print the runsettings generated for a project
    Runsettings {
        /// Project file
        project_file: PathBuf,

        /// Solution directory, used for custom templates and output folders
        #[arg(long)]
        solution_dir: Option<PathBuf>,
    },

    /// Run the coverage tool for one project
    Run {
        /// Project file
        project_file: PathBuf,

        /// Test binary built from the project
        test_binary: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let app_data = match cli.app_data {
        Some(dir) => dir,
        None => app_data_dir()?,
    };
    let options = ConfigService::new(&app_data)?.options().clone();
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let installer = Arc::new(ToolInstaller::coverlet(runner.clone(), coverlet_dir(&app_data))?);

    match cli.command {
        Commands::EnsureTool => {
            let state = installer.ensure_ready().await?;
            println!(
                "{} {}",
                state.current_version.as_deref().unwrap_or("unknown"),
                state
                    .executable_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }
        Commands::EnsurePackage { zips_dir } => {
            let zip = DirectoryZipProvider::new(&zips_dir)
                .provide_zip(MS_CODE_COVERAGE_ZIP_PREFIX)?
                .with_context(|| format!("no {} package in {}", MS_CODE_COVERAGE_ZIP_PREFIX, zips_dir.display()))?;
            let destination = ensure_unzipped(&ms_code_coverage_dir(&app_data), &zip)?;
            println!("{} {}", zip.version, destination.display());
        }
        Commands::Runsettings {
            project_file,
            solution_dir,
        } => {
            let mut projects = [CoverageProject::new(&project_file, PathBuf::new()).with_settings(options.project_settings())];
            assign_output_folders(&mut projects, solution_dir.as_deref());

            let generator = ProjectRunSettingsGenerator::new(RunSettingsTemplate::new()?);
            let generated = generator.create_project_run_settings(
                &projects[0],
                solution_dir.as_deref(),
                &ms_test_adapter_path(&ms_code_coverage_dir(&app_data)),
            )?;
            if let Some(path) = &generated.custom_template_path {
                info!("Using custom template {}", path.display());
            }
            println!("{}", generated.run_settings);
        }
        Commands::Run {
            project_file,
            test_binary,
        } => {
            let mut projects = [CoverageProject::new(&project_file, &test_binary).with_settings(options.project_settings())];
            assign_output_folders(&mut projects, None);
            let project = &projects[0];
            project
                .prepare_for_coverage()
                .with_context(|| format!("preparing {}", project.project_output_folder.display()))?;

            installer.ensure_ready().await?;
            let coverlet = CoverletRunner::new(runner, installer);

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            if !coverlet.run(project, FailureMode::Strict, &cancel).await? {
                bail!("coverage run failed for {}", project.project_name());
            }
            println!("{}", project.cover_tool_output_file().display());
        }
    }

    Ok(())
}
