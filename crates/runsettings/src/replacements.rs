//! Template Replacement Sets
//!
//! Concrete placeholder bindings for one project, or the merge of several
//! projects when the host asks for runsettings covering many test containers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fine_coverage_core::CoverageProject;

use crate::template::placeholders;
use crate::xml::escape;

/// Include and exclude entries for one filter category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeExclude {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
}

impl IncludeExclude {
    fn new(exclude: &[String], include: &[String]) -> Self {
        Self {
            exclude: non_blank(exclude),
            include: non_blank(include),
        }
    }

    fn merge(&mut self, other: &IncludeExclude) {
        union_into(&mut self.exclude, &other.exclude);
        union_into(&mut self.include, &other.include);
    }
}

/// Placeholder bindings for the alternate collector's runsettings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementSet {
    pub enabled: bool,
    pub results_directory: String,
    /// Install path of the alternate collector (its test adapter folder)
    pub test_adapter: String,
    pub module_paths: IncludeExclude,
    pub functions: IncludeExclude,
    pub attributes: IncludeExclude,
    pub sources: IncludeExclude,
    pub company_names: IncludeExclude,
    pub public_key_tokens: IncludeExclude,
}

impl ReplacementSet {
    /// Build the replacement set for a single project.
    pub fn for_project(project: &CoverageProject, test_adapter: &Path) -> Self {
        let settings = &project.settings;

        let mut module_paths =
            IncludeExclude::new(&settings.module_paths_exclude, &settings.module_paths_include);
        let referenced_excludes: Vec<String> = project
            .excluded_referenced_projects
            .iter()
            .map(|name| referenced_project_module_path(name))
            .collect();
        let referenced_includes: Vec<String> = project
            .included_referenced_projects
            .iter()
            .map(|name| referenced_project_module_path(name))
            .collect();
        union_into(&mut module_paths.exclude, &non_blank(&referenced_excludes));
        union_into(&mut module_paths.include, &non_blank(&referenced_includes));

        Self {
            enabled: settings.enabled,
            results_directory: project.project_output_folder.to_string_lossy().into_owned(),
            test_adapter: test_adapter.to_string_lossy().into_owned(),
            module_paths,
            functions: IncludeExclude::new(&settings.functions_exclude, &settings.functions_include),
            attributes: IncludeExclude::new(&settings.attributes_exclude, &settings.attributes_include),
            sources: IncludeExclude::new(&settings.sources_exclude, &settings.sources_include),
            company_names: IncludeExclude::new(
                &settings.company_names_exclude,
                &settings.company_names_include,
            ),
            public_key_tokens: IncludeExclude::new(
                &settings.public_key_tokens_exclude,
                &settings.public_key_tokens_include,
            ),
        }
    }

    /// Build the merged replacement set for the host's test containers.
    ///
    /// Containers without an entry in `lookup` are ignored. The results
    /// directory comes from the first matched container.
    pub fn for_test_containers(
        test_containers: &[PathBuf],
        lookup: &HashMap<PathBuf, CoverageProject>,
        test_adapter: &Path,
    ) -> Self {
        let sets: Vec<ReplacementSet> = test_containers
            .iter()
            .filter_map(|container| lookup.get(container))
            .map(|project| Self::for_project(project, test_adapter))
            .collect();
        Self::merge(&sets).unwrap_or_else(|| ReplacementSet {
            test_adapter: test_adapter.to_string_lossy().into_owned(),
            ..Default::default()
        })
    }

    /// Union several sets. Returns `None` when `sets` is empty.
    pub fn merge(sets: &[ReplacementSet]) -> Option<Self> {
        let (first, rest) = sets.split_first()?;
        let mut merged = first.clone();
        for set in rest {
            merged.enabled |= set.enabled;
            merged.module_paths.merge(&set.module_paths);
            merged.functions.merge(&set.functions);
            merged.attributes.merge(&set.attributes);
            merged.sources.merge(&set.sources);
            merged.company_names.merge(&set.company_names);
            merged.public_key_tokens.merge(&set.public_key_tokens);
        }
        Some(merged)
    }

    /// Placeholder token to rendered value, every value XML-escaped.
    pub fn bindings(&self) -> Vec<(&'static str, String)> {
        vec![
            (placeholders::ENABLED, self.enabled.to_string()),
            (placeholders::RESULTS_DIRECTORY, escape(&self.results_directory)),
            (placeholders::TEST_ADAPTER, escape(&self.test_adapter)),
            (placeholders::MODULE_PATHS_EXCLUDE, render("ModulePath", &self.module_paths.exclude)),
            (placeholders::MODULE_PATHS_INCLUDE, render("ModulePath", &self.module_paths.include)),
            (placeholders::FUNCTIONS_EXCLUDE, render("Function", &self.functions.exclude)),
            (placeholders::FUNCTIONS_INCLUDE, render("Function", &self.functions.include)),
            (placeholders::ATTRIBUTES_EXCLUDE, render("Attribute", &self.attributes.exclude)),
            (placeholders::ATTRIBUTES_INCLUDE, render("Attribute", &self.attributes.include)),
            (placeholders::SOURCES_EXCLUDE, render("Source", &self.sources.exclude)),
            (placeholders::SOURCES_INCLUDE, render("Source", &self.sources.include)),
            (placeholders::COMPANY_NAMES_EXCLUDE, render("CompanyName", &self.company_names.exclude)),
            (placeholders::COMPANY_NAMES_INCLUDE, render("CompanyName", &self.company_names.include)),
            (
                placeholders::PUBLIC_KEY_TOKENS_EXCLUDE,
                render("PublicKeyToken", &self.public_key_tokens.exclude),
            ),
            (
                placeholders::PUBLIC_KEY_TOKENS_INCLUDE,
                render("PublicKeyToken", &self.public_key_tokens.include),
            ),
        ]
    }
}

/// Module path regex matching a referenced project's assembly.
fn referenced_project_module_path(name: &str) -> String {
    format!(r".*\\{}.dll$", name.trim())
}

fn render(element: &str, values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("<{0}>{1}</{0}>", element, escape(v)))
        .collect()
}

fn non_blank(values: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    union_into(
        &mut out,
        &values
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>(),
    );
    out
}

fn union_into(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}
