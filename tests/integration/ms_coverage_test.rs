//! Alternate Collector Integration Tests
//!
//! Collection status decisions, generated runsettings on disk, host
//! runsettings injection and the report handoff with cleanup.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use fine_coverage::utils::paths::{ms_code_coverage_dir, ms_shim_path};
use fine_coverage::{AppOptions, CollectionStatus, MsCodeCoverageService};
use fine_coverage_core::{assign_output_folders, RunSettingsRequestState, TestOperationState};
use fine_coverage_runsettings::{RunSettingsTemplate, GENERATED_MARKER};
use fine_coverage_tools::DirectoryZipProvider;

use crate::support::{FakeOperation, Harness};

const PLAIN_USER_RUN_SETTINGS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<RunSettings>
  <RunConfiguration>
    <MaxCpuCount>1</MaxCpuCount>
  </RunConfiguration>
</RunSettings>"#;

const CONFLICTING_USER_RUN_SETTINGS: &str = r#"<RunSettings>
  <DataCollectionRunSettings>
    <DataCollectors>
      <DataCollector friendlyName="XPlat code coverage" />
    </DataCollectors>
  </DataCollectionRunSettings>
</RunSettings>"#;

fn ms_options() -> AppOptions {
    AppOptions {
        ms_code_coverage: true,
        ..AppOptions::default()
    }
}

#[tokio::test]
async fn test_generates_run_settings_for_projects_without_any() {
    let harness = Harness::new(ms_options()).await;
    let solution = harness.root().to_path_buf();
    let operation = FakeOperation {
        solution: Some(solution.clone()),
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let status = harness
        .context
        .ms_coverage()
        .is_collecting(&operation, operation.projects.clone(), true)
        .await;
    assert_eq!(status, CollectionStatus::Collecting);

    let mut assigned = operation.projects.clone();
    assign_output_folders(&mut assigned, Some(&solution));
    let generated = assigned[0].generated_run_settings_file();
    assert!(generated.starts_with(solution.join("fine-code-coverage").join("Alpha")));

    let content = std::fs::read_to_string(&generated).unwrap();
    assert!(content.contains(GENERATED_MARKER));
    assert!(!content.contains("%fcc_"));
    assert!(RunSettingsTemplate::fcc_generated(&content));
    assert_eq!(
        harness
            .context
            .ms_coverage()
            .generated_run_settings_for(&assigned[0].test_dll_file),
        Some(generated)
    );
}

#[tokio::test]
async fn test_not_collecting_without_preference() {
    let harness = Harness::new(AppOptions::default()).await;
    let operation = FakeOperation {
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let status = harness
        .context
        .ms_coverage()
        .is_collecting(&operation, operation.projects.clone(), false)
        .await;
    assert_eq!(status, CollectionStatus::NotCollecting);
}

#[tokio::test]
async fn test_conflicting_sibling_rejects_whole_run() {
    let harness = Harness::new(ms_options()).await;
    let good = harness.write_user_run_settings(harness.project("Alpha"), PLAIN_USER_RUN_SETTINGS);
    let bad = harness.write_user_run_settings(harness.project("Beta"), CONFLICTING_USER_RUN_SETTINGS);
    let operation = FakeOperation {
        projects: vec![good, bad],
        ..Default::default()
    };

    let status = harness
        .context
        .ms_coverage()
        .is_collecting(&operation, operation.projects.clone(), true)
        .await;
    assert_eq!(status, CollectionStatus::NotCollecting);
    assert!(harness.report.logged("unsuitable"));
}

#[tokio::test]
async fn test_user_run_settings_injection() {
    let harness = Harness::new(ms_options()).await;
    let mut project = harness.write_user_run_settings(harness.project("Alpha"), PLAIN_USER_RUN_SETTINGS);
    project.settings.module_paths_exclude = vec![".*Moq.dll$".to_string()];
    let operation = FakeOperation {
        projects: vec![project.clone()],
        ..Default::default()
    };

    let ms = harness.context.ms_coverage();
    assert_eq!(
        ms.is_collecting(&operation, operation.projects.clone(), true).await,
        CollectionStatus::Collecting
    );
    assert!(harness.report.logged("with user runsettings"));

    let containers = vec![project.test_dll_file.clone()];
    assert_eq!(
        ms.add_run_settings(PLAIN_USER_RUN_SETTINGS, RunSettingsRequestState::Discovery, &containers),
        None
    );

    let injected = ms
        .add_run_settings(PLAIN_USER_RUN_SETTINGS, RunSettingsRequestState::Execution, &containers)
        .unwrap();
    assert!(RunSettingsTemplate::fcc_generated(&injected));
    assert!(injected.contains("<MaxCpuCount>1</MaxCpuCount>"));
    assert!(injected.contains("<ModulePath>.*Moq.dll$</ModulePath>"));

    // already injected documents are left alone
    assert_eq!(
        ms.add_run_settings(&injected, RunSettingsRequestState::Execution, &containers),
        None
    );
}

#[tokio::test]
async fn test_collect_reports_and_removes_generated_files() {
    let harness = Harness::new(ms_options()).await;
    let solution = harness.root().to_path_buf();
    let results = harness.root().join("TestResults");
    std::fs::create_dir_all(&results).unwrap();
    let cobertura = results.join("run.cobertura.xml");
    std::fs::write(&cobertura, "<coverage/>").unwrap();

    let operation = FakeOperation {
        total: Some(30),
        failed: Some(0),
        solution: Some(solution.clone()),
        projects: vec![harness.project("Alpha")],
        result_uris: vec![
            cobertura.to_string_lossy().into_owned(),
            results.join("run.coverage").to_string_lossy().into_owned(),
        ],
    };

    let mut coordinator = harness.context.coordinator();
    coordinator
        .handle_event(TestOperationState::Starting, &operation)
        .await;

    let mut assigned = operation.projects.clone();
    assign_output_folders(&mut assigned, Some(&solution));
    let generated = assigned[0].generated_run_settings_file();
    assert!(generated.exists());

    coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;
    harness.context.engine().wait_idle().await;

    assert_eq!(harness.report.last_files(), Some(vec![cobertura]));
    assert!(!generated.exists());
    // the host ran the tests, not the coverage tool
    assert_eq!(harness.tool.coverage_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_collect_without_cobertura_files_still_reports() {
    let harness = Harness::new(ms_options()).await;
    let operation = FakeOperation {
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    coordinator
        .handle_event(TestOperationState::Starting, &operation)
        .await;
    coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;
    harness.context.engine().wait_idle().await;

    assert!(harness.report.logged("No cobertura files"));
    assert_eq!(harness.report.last_files(), Some(vec![]));
}

fn write_package_zip(path: &Path, shim_relative: &str) {
    let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    writer
        .start_file(shim_relative, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"shim").unwrap();
    writer.finish().unwrap();
}

#[tokio::test]
async fn test_package_is_unzipped_and_shim_copied() {
    let harness = Harness::new(ms_options()).await;
    let tool_directory = ms_code_coverage_dir(harness.context.app_data());
    let shim_relative = ms_shim_path(Path::new(""))
        .to_string_lossy()
        .replace('\\', "/");

    let zips = harness.root().join("zips");
    std::fs::create_dir_all(&zips).unwrap();
    write_package_zip(&zips.join("microsoft.codecoverage.17.1.0.zip"), &shim_relative);

    let ms = MsCodeCoverageService::new(
        &tool_directory,
        harness.context.generator().clone(),
        harness.context.engine().clone(),
    )
    .with_tool_zips(Arc::new(DirectoryZipProvider::new(&zips)));
    assert!(!ms.package_present());
    assert!(ms.ensure_package());
    assert!(ms_shim_path(&tool_directory).is_file());

    let project = harness.project("Alpha");
    let operation = FakeOperation {
        solution: Some(harness.root().to_path_buf()),
        projects: vec![project.clone()],
        ..Default::default()
    };
    let status = ms.is_collecting(&operation, operation.projects.clone(), true).await;
    assert_eq!(status, CollectionStatus::Collecting);

    let copied = project
        .test_dll_directory()
        .join("Microsoft.VisualStudio.CodeCoverage.Shim.dll");
    assert_eq!(std::fs::read_to_string(copied).unwrap(), "shim");
}

#[tokio::test]
async fn test_missing_package_is_reported() {
    let harness = Harness::new(ms_options()).await;
    let ms = MsCodeCoverageService::new(
        ms_code_coverage_dir(harness.context.app_data()),
        harness.context.generator().clone(),
        harness.context.engine().clone(),
    )
    .with_tool_zips(Arc::new(DirectoryZipProvider::new(harness.root().join("no-zips"))));
    assert!(!ms.ensure_package());
}
