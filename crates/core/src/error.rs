//! Core Error Types
//!
//! Defines the failure taxonomy shared by every Fine Coverage crate. These
//! error types are dependency-free (only thiserror + std) to keep the core
//! crate lightweight.
//!
//! The application crate wraps these in `AppError` together with options
//! storage failures.

use thiserror::Error;

/// Core error type for the Fine Coverage workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The coverage tool could not be installed or updated, or has no
    /// resolved executable path
    #[error("Coverage tool not ready: {0}")]
    ToolNotReady(String),

    /// The external tool exceeded its time budget and was killed
    #[error("Tool timed out after {elapsed_secs:.1} seconds (timeout is {timeout_secs} seconds)")]
    ToolExecutionTimeout { elapsed_secs: f64, timeout_secs: u64 },

    /// The external tool exited with a non-zero exit code
    #[error("Tool exited with code {exit_code}: {output}")]
    ToolExecutionFailed { exit_code: i32, output: String },

    /// The mix of existing user runsettings cannot be used for collection
    #[error("Run settings unsuitable: {0}")]
    RunSettingsUnsuitable(String),

    /// Building replacements or applying a template failed
    #[error("Template generation failed: {0}")]
    TemplateGenerationFailed(String),

    /// Removing generated configuration failed
    #[error("Configuration cleanup failed: {0}")]
    ConfigurationCleanupFailed(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Command spawn errors
    #[error("Command error: {0}")]
    Command(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parse errors (XML documents, versions, URIs)
    #[error("Parse error: {0}")]
    Parse(String),

    /// The operation observed its cancellation signal
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a tool-not-ready error
    pub fn tool_not_ready(msg: impl Into<String>) -> Self {
        Self::ToolNotReady(msg.into())
    }

    /// Create an unsuitable run settings error
    pub fn unsuitable(msg: impl Into<String>) -> Self {
        Self::RunSettingsUnsuitable(msg.into())
    }

    /// Create a template generation error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::TemplateGenerationFailed(msg.into())
    }

    /// Create a cleanup error
    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::ConfigurationCleanupFailed(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from the tool exceeding its time budget
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ToolExecutionTimeout { .. })
    }
}
