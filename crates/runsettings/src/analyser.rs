//! RunSettings Suitability Analysis
//!
//! Decides whether the user runsettings of a run's projects can be used for
//! alternate-collector collection. A single incompatible file rejects the
//! whole run; partial collection is never attempted.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use fine_coverage_core::{CoreError, CoreResult, CoverageProject};

use crate::template::{
    data_collectors, is_alternate_collector, is_collector_enabled, placeholders, test_adapters_paths,
    RunSettingsTemplate,
};
use crate::xml::XmlElement;

/// Outcome of analysing a run's user runsettings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub suitable: bool,
    /// Some user runsettings explicitly enabled the alternate collector
    pub specified_alternate_collector: bool,
    /// Compatible projects whose runsettings point at the alternate
    /// collector's test adapter and need the compatibility shim
    pub projects_with_alternate_adapter: Vec<CoverageProject>,
    /// Why the run was rejected
    pub unsuitable_reason: Option<String>,
}

impl AnalysisResult {
    /// `RunSettingsUnsuitable` when a runsettings file rejected the run.
    pub fn ensure_suitable(&self) -> CoreResult<()> {
        match (&self.unsuitable_reason, self.suitable) {
            (Some(reason), _) => Err(CoreError::unsuitable(reason.clone())),
            (None, false) => Err(CoreError::unsuitable("not analysed")),
            (None, true) => Ok(()),
        }
    }
}

/// Verdict for one user runsettings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible {
        specified_alternate_collector: bool,
        uses_alternate_adapter: bool,
    },
    Incompatible(String),
}

/// Analyse the runsettings of `projects` that carry a user file.
///
/// Projects without a runsettings file are ignored. `tool_install_path` is
/// the alternate collector's install folder.
pub fn analyse(
    projects: &[CoverageProject],
    use_alternate_collector: bool,
    tool_install_path: &Path,
) -> AnalysisResult {
    let mut specified = false;
    let mut with_alternate_adapter = Vec::new();

    for project in projects {
        let Some(run_settings_file) = project.run_settings_file.as_deref() else {
            continue;
        };

        let verdict = match std::fs::read_to_string(run_settings_file) {
            Ok(document) => check_document(&document, use_alternate_collector, tool_install_path),
            Err(e) => Compatibility::Incompatible(format!("cannot read file: {}", e)),
        };

        match verdict {
            Compatibility::Compatible {
                specified_alternate_collector,
                uses_alternate_adapter,
            } => {
                debug!(
                    "[Analyser] {} is compatible (specified: {})",
                    run_settings_file.display(),
                    specified_alternate_collector
                );
                specified |= specified_alternate_collector;
                if uses_alternate_adapter {
                    with_alternate_adapter.push(project.clone());
                }
            }
            Compatibility::Incompatible(reason) => {
                let reason = format!(
                    "{} of {}: {}",
                    run_settings_file.display(),
                    project.project_name(),
                    reason
                );
                warn!("[Analyser] Run settings unsuitable, {}", reason);
                return AnalysisResult {
                    unsuitable_reason: Some(reason),
                    ..AnalysisResult::default()
                };
            }
        }
    }

    AnalysisResult {
        suitable: true,
        specified_alternate_collector: specified,
        projects_with_alternate_adapter: with_alternate_adapter,
        unsuitable_reason: None,
    }
}

/// Check one runsettings document.
pub fn check_document(document: &str, use_alternate_collector: bool, tool_install_path: &Path) -> Compatibility {
    if let Some(token) = unknown_placeholder(document) {
        return Compatibility::Incompatible(format!("unrecognised placeholder {}", token));
    }

    let root = match XmlElement::parse(document) {
        Ok(root) => root,
        Err(e) => return Compatibility::Incompatible(e.to_string()),
    };

    let mut alternate_enabled = false;
    for collector in data_collectors(&root) {
        if is_alternate_collector(collector) {
            if let Some(format) = collector.descendant(&["Configuration", "Format"]) {
                let format = format.text();
                if !format.trim().eq_ignore_ascii_case("cobertura") {
                    return Compatibility::Incompatible(format!(
                        "alternate collector format is {}, expected Cobertura",
                        format.trim()
                    ));
                }
            }
            alternate_enabled |= is_collector_enabled(collector);
        } else if is_collector_enabled(collector) && mentions_coverage(collector) {
            return Compatibility::Incompatible(format!(
                "conflicting coverage collector {}",
                collector
                    .attribute("friendlyName")
                    .or_else(|| collector.attribute("uri"))
                    .unwrap_or_default()
            ));
        }
    }

    if !alternate_enabled && !use_alternate_collector {
        return Compatibility::Incompatible("alternate collector is neither specified nor preferred".to_string());
    }

    let install_path = tool_install_path.to_string_lossy();
    let uses_alternate_adapter = test_adapters_paths(&root)
        .map(|paths| {
            paths.contains(placeholders::TEST_ADAPTER)
                || (!install_path.is_empty() && paths.contains(install_path.as_ref()))
        })
        .unwrap_or(false);

    Compatibility::Compatible {
        specified_alternate_collector: alternate_enabled,
        uses_alternate_adapter,
    }
}

fn mentions_coverage(collector: &XmlElement) -> bool {
    ["friendlyName", "uri"].iter().any(|attr| {
        collector
            .attribute(attr)
            .map(|v| v.to_ascii_lowercase().contains("coverage"))
            .unwrap_or(false)
    })
}

/// First `%fcc_...%` token that is not a recognised placeholder.
fn unknown_placeholder(document: &str) -> Option<String> {
    let is_token_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut rest = document;
    while let Some(start) = rest.find(placeholders::PREFIX) {
        let candidate = &rest[start..];
        let body = &candidate[1..];
        match body.find('%') {
            Some(end) if body[..end].chars().all(is_token_char) => {
                let token = &candidate[..end + 2];
                if !RunSettingsTemplate::recognizes(token) {
                    return Some(token.to_string());
                }
                rest = &candidate[end + 2..];
            }
            _ => {
                let len = body.find(|c: char| !is_token_char(c)).unwrap_or(body.len());
                return Some(candidate[..len + 1].to_string());
            }
        }
    }
    None
}
