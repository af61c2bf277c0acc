//! Coverage Project Model
//!
//! One `CoverageProject` exists per test project participating in a run. The
//! test-operation collaborator produces them fresh for each run; the
//! coordinator owns them for the run's duration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Folder created beside projects (or the solution) to hold coverage output.
pub const OUTPUT_FOLDER_NAME: &str = "fine-code-coverage";

/// Project-level folder name used when no solution directory is known.
const PROJECT_LEVEL_OUTPUT_FOLDER: &str = "coverage-tool-output";

/// Suffix of runsettings files generated for projects that had none.
const GENERATED_RUN_SETTINGS_SUFFIX: &str = "-fcc-mscodecoverage-generated.runsettings";

/// Per-project coverage settings.
///
/// The first group drives the inline coverage tool; the `*_exclude` /
/// `*_include` groups drive the alternate collector's runsettings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub enabled: bool,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub exclude_by_file: Vec<String>,
    pub exclude_by_attribute: Vec<String>,
    pub include_test_assembly: bool,
    /// Seconds the coverage tool may run before it is killed
    pub cover_tool_timeout: u64,

    pub module_paths_exclude: Vec<String>,
    pub module_paths_include: Vec<String>,
    pub functions_exclude: Vec<String>,
    pub functions_include: Vec<String>,
    pub attributes_exclude: Vec<String>,
    pub attributes_include: Vec<String>,
    pub sources_exclude: Vec<String>,
    pub sources_include: Vec<String>,
    pub company_names_exclude: Vec<String>,
    pub company_names_include: Vec<String>,
    pub public_key_tokens_exclude: Vec<String>,
    pub public_key_tokens_include: Vec<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude: Vec::new(),
            include: Vec::new(),
            exclude_by_file: Vec::new(),
            exclude_by_attribute: Vec::new(),
            include_test_assembly: true,
            cover_tool_timeout: 300,
            module_paths_exclude: Vec::new(),
            module_paths_include: Vec::new(),
            functions_exclude: Vec::new(),
            functions_include: Vec::new(),
            attributes_exclude: Vec::new(),
            attributes_include: Vec::new(),
            sources_exclude: Vec::new(),
            sources_include: Vec::new(),
            company_names_exclude: Vec::new(),
            company_names_include: Vec::new(),
            public_key_tokens_exclude: Vec::new(),
            public_key_tokens_include: Vec::new(),
        }
    }
}

/// A test project participating in a coverage-enabled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageProject {
    pub project_file: PathBuf,
    pub test_dll_file: PathBuf,
    /// Unique per project per run; see [`assign_output_folders`]
    pub project_output_folder: PathBuf,
    #[serde(default)]
    pub settings: ProjectSettings,
    /// `None` when the project has no user-supplied runsettings
    #[serde(default)]
    pub run_settings_file: Option<PathBuf>,
    #[serde(default)]
    pub excluded_referenced_projects: Vec<String>,
    #[serde(default)]
    pub included_referenced_projects: Vec<String>,
}

impl CoverageProject {
    /// Create a project with default settings and no user runsettings.
    ///
    /// The output folder starts at the project level; call
    /// [`assign_output_folders`] once the solution directory is known.
    pub fn new(project_file: impl Into<PathBuf>, test_dll_file: impl Into<PathBuf>) -> Self {
        let project_file = project_file.into();
        let project_output_folder = project_level_output_root(&project_file).join(PROJECT_LEVEL_OUTPUT_FOLDER);
        Self {
            project_file,
            test_dll_file: test_dll_file.into(),
            project_output_folder,
            settings: ProjectSettings::default(),
            run_settings_file: None,
            excluded_referenced_projects: Vec::new(),
            included_referenced_projects: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: ProjectSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_run_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_settings_file = Some(path.into());
        self
    }

    pub fn with_excluded_referenced_projects(mut self, names: Vec<String>) -> Self {
        self.excluded_referenced_projects = names;
        self
    }

    pub fn with_included_referenced_projects(mut self, names: Vec<String>) -> Self {
        self.included_referenced_projects = names;
        self
    }

    /// Project name, taken from the project file stem.
    pub fn project_name(&self) -> String {
        self.project_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory containing the project file.
    pub fn project_directory(&self) -> &Path {
        self.project_file.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Directory containing the test binary; the coverage tool runs here.
    pub fn test_dll_directory(&self) -> &Path {
        self.test_dll_file.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn has_user_run_settings(&self) -> bool {
        self.run_settings_file.is_some()
    }

    /// File the inline coverage tool writes its cobertura report to.
    pub fn cover_tool_output_file(&self) -> PathBuf {
        self.project_output_folder
            .join(format!("{}.coverage.xml", self.project_name()))
    }

    /// Scratch folder for the nested test invocation's results and diagnostics.
    pub fn work_output_folder(&self) -> PathBuf {
        self.project_output_folder.join("buildoutput")
    }

    /// Where runsettings generated for this project are written.
    pub fn generated_run_settings_file(&self) -> PathBuf {
        self.project_output_folder
            .join(format!("{}{}", self.project_name(), GENERATED_RUN_SETTINGS_SUFFIX))
    }

    /// Delete and recreate the project's output folder.
    ///
    /// The folder is owned exclusively by the current run, so anything left
    /// from a previous attempt is discarded.
    pub fn prepare_for_coverage(&self) -> CoreResult<()> {
        if self.project_output_folder.as_os_str().is_empty() {
            return Err(CoreError::config(format!(
                "No output folder assigned for project {}",
                self.project_file.display()
            )));
        }
        if self.project_output_folder.exists() {
            fs::remove_dir_all(&self.project_output_folder)?;
        }
        fs::create_dir_all(&self.project_output_folder)?;
        Ok(())
    }
}

fn project_level_output_root(project_file: &Path) -> PathBuf {
    project_file
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(OUTPUT_FOLDER_NAME)
}

/// Assign each project a unique coverage output folder.
///
/// With a solution directory every project gets
/// `<solution>/fine-code-coverage/<project name>`. Without one, each project
/// gets a folder beside its own project file. Folders that would collide are
/// disambiguated with a numeric suffix.
pub fn assign_output_folders(projects: &mut [CoverageProject], solution_directory: Option<&Path>) {
    let mut used = HashSet::new();
    for project in projects.iter_mut() {
        let (root, name) = match solution_directory {
            Some(solution_directory) => (solution_directory.join(OUTPUT_FOLDER_NAME), project.project_name()),
            None => (
                project_level_output_root(&project.project_file),
                PROJECT_LEVEL_OUTPUT_FOLDER.to_string(),
            ),
        };
        let mut candidate = name.clone();
        let mut n = 1;
        while !used.insert(root.join(&candidate).to_string_lossy().to_lowercase()) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        project.project_output_folder = root.join(candidate);
    }
}
