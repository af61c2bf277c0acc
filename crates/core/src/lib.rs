//! Fine Coverage Core
//!
//! Foundational types shared by every Fine Coverage crate: the error
//! taxonomy, the coverage project model, and the interfaces of the host
//! collaborators the engine talks to. This crate has no dependency on the
//! process runner, the runsettings pipeline, or the application crate.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `project` - `CoverageProject`, `ProjectSettings`, output folder assignment
//! - `context` - Collaborator traits (`TestOperation`, `ReportGenerator`) and decisions

pub mod context;
pub mod error;
pub mod project;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Project Model ──────────────────────────────────────────────────────
pub use project::{assign_output_folders, CoverageProject, ProjectSettings, OUTPUT_FOLDER_NAME};

// ── Collaborators ──────────────────────────────────────────────────────
pub use context::{
    ReloadCoverageRequest, ReportGenerator, ReportResult, RunSettingsRequestState, TestOperation,
    TestOperationState,
};
