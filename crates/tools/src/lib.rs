//! Fine Coverage Tools
//!
//! External process plumbing for the coverage tool:
//! - `process` - `CommandRunner` trait and the real `ProcessRunner` (timeout, forced kill, grace period)
//! - `installer` - install/update/version management of the coverage tool
//! - `coverlet` - argument construction and per-project execution
//! - `package` - zipped tool packages unzipped into app data
//!
//! The engine only talks to the tool through these types, so tests can
//! substitute a scripted `CommandRunner`.

pub mod coverlet;
pub mod installer;
pub mod package;
pub mod process;

pub use coverlet::{build_arguments, CoverletRunner};
pub use installer::{
    parse_tool_list_version, required_action, InstallAction, ToolInstaller, ToolVersionState,
    COVERLET_TOOL_NAME, MINIMUM_COVERLET_VERSION,
};
pub use package::{ensure_unzipped, DirectoryZipProvider, ToolZip, ToolZipProvider};
pub use process::{CommandRunner, FailureMode, ProcessOutput, ProcessRequest, ProcessRunner, KILL_GRACE_PERIOD};
