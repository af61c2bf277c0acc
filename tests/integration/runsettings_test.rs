//! RunSettings Integration Tests
//!
//! Template resolution against files on disk, byte-stable generation and
//! suitability analysis of user runsettings files.

use std::fs;
use std::path::Path;

use fine_coverage_core::{assign_output_folders, CoverageProject};
use fine_coverage_runsettings::{
    analyse, ProjectRunSettingsGenerator, RunSettingsTemplate, XmlElement, CUSTOM_TEMPLATE_FILE_NAME,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn project(root: &Path, name: &str) -> CoverageProject {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("bin")).unwrap();
    let mut projects = [CoverageProject::new(
        dir.join(format!("{}.csproj", name)),
        dir.join("bin").join(format!("{}.dll", name)),
    )];
    assign_output_folders(&mut projects, Some(root));
    projects[0].clone()
}

fn custom_template(marker: &str) -> String {
    format!(
        r#"<RunSettings>
  <RunConfiguration>
    <ResultsDirectory>%fcc_resultsdirectory%</ResultsDirectory>
    <TestAdaptersPaths>%fcc_testadapter%</TestAdaptersPaths>
    <{marker}>true</{marker}>
  </RunConfiguration>
</RunSettings>"#
    )
}

fn generator() -> ProjectRunSettingsGenerator {
    ProjectRunSettingsGenerator::new(RunSettingsTemplate::new().unwrap())
}

// ============================================================================
// Template resolution
// ============================================================================

#[test]
fn test_project_template_wins_over_solution_template() {
    let root = TempDir::new().unwrap();
    let alpha = project(root.path(), "Alpha");
    let beta = project(root.path(), "Beta");
    fs::write(root.path().join(CUSTOM_TEMPLATE_FILE_NAME), custom_template("SolutionLevel")).unwrap();
    fs::write(alpha.project_directory().join(CUSTOM_TEMPLATE_FILE_NAME), custom_template("ProjectLevel")).unwrap();

    let generator = generator();
    let adapter = root.path().join("msCodeCoverage").join("build");

    let alpha_settings = generator
        .create_project_run_settings(&alpha, Some(root.path()), &adapter)
        .unwrap();
    assert!(alpha_settings.run_settings.contains("<ProjectLevel>true</ProjectLevel>"));
    assert_eq!(
        alpha_settings.custom_template_path,
        Some(alpha.project_directory().join(CUSTOM_TEMPLATE_FILE_NAME))
    );
    assert!(alpha_settings.replaced_test_adapter);

    let beta_settings = generator
        .create_project_run_settings(&beta, Some(root.path()), &adapter)
        .unwrap();
    assert!(beta_settings.run_settings.contains("<SolutionLevel>true</SolutionLevel>"));
    assert!(RunSettingsTemplate::fcc_generated(&beta_settings.run_settings));
}

#[test]
fn test_built_in_template_without_custom_files() {
    let root = TempDir::new().unwrap();
    let alpha = project(root.path(), "Alpha");

    let settings = generator()
        .create_project_run_settings(&alpha, None, Path::new("/tools/ms"))
        .unwrap();

    assert!(settings.custom_template_path.is_none());
    let document = XmlElement::parse(&settings.run_settings).unwrap();
    let results = document
        .descendant(&["RunConfiguration", "ResultsDirectory"])
        .unwrap()
        .text();
    assert_eq!(Path::new(results.trim()), alpha.project_output_folder.as_path());
}

#[test]
fn test_generation_is_byte_stable() {
    let root = TempDir::new().unwrap();
    let mut alpha = project(root.path(), "Alpha");
    alpha.settings.functions_exclude = vec!["^System\\.".to_string(), "  ".to_string()];
    let generator = generator();

    let first = generator
        .create_project_run_settings(&alpha, None, Path::new("/tools/ms"))
        .unwrap();
    let second = generator
        .create_project_run_settings(&alpha, None, Path::new("/tools/ms"))
        .unwrap();

    assert_eq!(first.run_settings, second.run_settings);
    assert!(!first.run_settings.contains("<Function></Function>"));
}

#[test]
fn test_invalid_custom_template_fails_generation() {
    let root = TempDir::new().unwrap();
    let alpha = project(root.path(), "Alpha");
    fs::write(alpha.project_directory().join(CUSTOM_TEMPLATE_FILE_NAME), "<NotRunSettings/>").unwrap();

    let result = generator().create_project_run_settings(&alpha, None, Path::new("/tools/ms"));
    assert!(result.is_err());
}

// ============================================================================
// Writing and removal
// ============================================================================

#[tokio::test]
async fn test_write_and_remove_generated_files() {
    let root = TempDir::new().unwrap();
    let projects = vec![project(root.path(), "Alpha"), project(root.path(), "Beta")];
    let generator = generator();

    let generated = generator
        .create_projects_run_settings(&projects, Some(root.path()), Path::new("/tools/ms"))
        .unwrap();
    let written = generator.write_projects_run_settings(&generated).await.unwrap();
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|p| p.exists()));

    fs::remove_file(&written[0]).unwrap();
    generator.remove_generated_project_settings(&projects).await.unwrap();
    assert!(written.iter().all(|p| !p.exists()));
}

// ============================================================================
// Suitability analysis
// ============================================================================

#[test]
fn test_analysis_over_files() {
    let root = TempDir::new().unwrap();
    let write = |name: &str, content: &str| {
        let project = project(root.path(), name);
        let path = project.project_directory().join("test.runsettings");
        fs::write(&path, content).unwrap();
        project.with_run_settings_file(path)
    };

    let specified = write(
        "Specified",
        r#"<RunSettings>
  <RunConfiguration><TestAdaptersPaths>%fcc_testadapter%</TestAdaptersPaths></RunConfiguration>
  <DataCollectionRunSettings><DataCollectors>
    <DataCollector friendlyName="Code Coverage" enabled="true">
      <Configuration><Format>Cobertura</Format></Configuration>
    </DataCollector>
  </DataCollectors></DataCollectionRunSettings>
</RunSettings>"#,
    );
    let wrong_format = write(
        "WrongFormat",
        r#"<RunSettings><DataCollectionRunSettings><DataCollectors>
    <DataCollector friendlyName="Code Coverage">
      <Configuration><Format>Coverage</Format></Configuration>
    </DataCollector>
  </DataCollectors></DataCollectionRunSettings></RunSettings>"#,
    );
    let no_settings = project(root.path(), "Plain");
    let tool_path = root.path().join("msCodeCoverage");

    let result = analyse(&[specified.clone(), no_settings.clone()], false, &tool_path);
    assert!(result.suitable);
    assert!(result.specified_alternate_collector);
    assert_eq!(result.projects_with_alternate_adapter, vec![specified.clone()]);

    let result = analyse(&[specified, wrong_format, no_settings], true, &tool_path);
    assert!(!result.suitable);
    assert!(result.projects_with_alternate_adapter.is_empty());
}
