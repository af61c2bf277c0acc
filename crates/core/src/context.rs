//! Collaborator Interfaces
//!
//! The engine never reaches into host objects directly. Everything it needs
//! from the host test platform and the report tool is expressed here:
//!
//! 1. `TestOperation` - capability view of one host test operation
//! 2. `ReportGenerator` - merges raw coverage files into a unified report
//! 3. `ReloadCoverageRequest` - the coordinator's decision for one event

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::project::CoverageProject;

// ============================================================================
// Host test operation
// ============================================================================

/// Capability interface over a host test operation.
///
/// Counts are `None` when the host cannot report them; policy treats an
/// unknown count as "no information" rather than zero.
#[async_trait]
pub trait TestOperation: Send + Sync {
    /// Total number of tests the operation ran, if known.
    fn total_tests(&self) -> Option<u64>;

    /// Number of failed tests, if known.
    fn failed_tests(&self) -> Option<u64>;

    /// Directory of the solution the operation belongs to, if any.
    fn solution_directory(&self) -> Option<PathBuf>;

    /// Result attachments the host's data collectors produced (URIs or paths).
    fn result_uris(&self) -> Vec<String> {
        Vec::new()
    }

    /// Enumerate the coverage projects participating in this operation.
    async fn get_coverage_projects(&self) -> CoreResult<Vec<CoverageProject>>;
}

/// Host lifecycle events for a test operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOperationState {
    Starting,
    Canceling,
    Finished,
}

/// Why the host is asking for runsettings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSettingsRequestState {
    Discovery,
    Execution,
}

// ============================================================================
// Report generation
// ============================================================================

/// Outcome of merging coverage files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub success: bool,
    /// Unified HTML report
    pub unified_html: Option<PathBuf>,
    /// Unified cobertura document
    pub unified_xml_file: Option<PathBuf>,
}

/// External report generator.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Merge `coverage_files` into a unified report under `output_folder`.
    async fn generate(&self, coverage_files: &[PathBuf], output_folder: &Path) -> CoreResult<ReportResult>;

    /// Mirror a message into the report tool's coverage process log.
    fn log_coverage_process(&self, _message: &str) {}
}

// ============================================================================
// Decisions
// ============================================================================

/// Decision produced by the lifecycle coordinator for one host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadCoverageRequest {
    /// Collect coverage for these projects (possibly none)
    Cover(Vec<CoverageProject>),
    Cancel,
}

impl ReloadCoverageRequest {
    pub fn is_cover(&self) -> bool {
        matches!(self, Self::Cover(_))
    }

    /// Projects carried by a `Cover` decision.
    pub fn projects(&self) -> Option<&[CoverageProject]> {
        match self {
            Self::Cover(projects) => Some(projects),
            Self::Cancel => None,
        }
    }
}
