//! Coverage Tool Installation & Version Management
//!
//! The coverage tool is a dotnet global tool installed into a private tool
//! folder. Before use its version is queried with `dotnet tool list`; a
//! missing tool is installed and an outdated one updated in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fine_coverage_core::{CoreError, CoreResult};

use crate::process::{CommandRunner, ProcessRequest};

/// Package name of the coverage tool.
pub const COVERLET_TOOL_NAME: &str = "coverlet.console";

/// Lowest supported coverage tool version.
pub const MINIMUM_COVERLET_VERSION: &str = "1.7.2";

/// Name of the executable shim the tool installs.
pub const COVERLET_EXECUTABLE: &str = "coverlet";

/// Budget for `dotnet tool` invocations.
const PACKAGE_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Installed tool status. `None` version means not installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolVersionState {
    pub current_version: Option<String>,
    pub executable_path: Option<PathBuf>,
}

impl ToolVersionState {
    pub fn is_ready(&self) -> bool {
        self.current_version.is_some() && self.executable_path.is_some()
    }
}

/// What `ensure_ready` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    None,
    Install,
    Update,
}

/// Find the tool's version in `dotnet tool list` output.
///
/// The matching line starts with the tool name; its second whitespace
/// separated token is the version. Unparsable versions count as missing.
pub fn parse_tool_list_version(output: &str, tool_name: &str) -> Option<Version> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| line.to_ascii_lowercase().starts_with(&tool_name.to_ascii_lowercase()))?;
    let token = line.split_whitespace().nth(1)?;
    match Version::parse(token.trim()) {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("[Installer] Unparsable {} version '{}': {}", tool_name, token, e);
            None
        }
    }
}

/// Decide the action needed for `current` given `minimum`.
pub fn required_action(current: Option<&Version>, minimum: &Version) -> InstallAction {
    match current {
        None => InstallAction::Install,
        Some(v) if v < minimum => InstallAction::Update,
        Some(_) => InstallAction::None,
    }
}

/// Manages the coverage tool in a fixed tool folder.
///
/// The version state is process-wide and only mutated here.
pub struct ToolInstaller {
    runner: Arc<dyn CommandRunner>,
    dotnet: PathBuf,
    tool_name: String,
    tool_directory: PathBuf,
    minimum_version: Version,
    state: RwLock<ToolVersionState>,
    /// Held across the query/install sequence
    install_lock: Mutex<()>,
}

impl ToolInstaller {
    /// Installer for the coverlet console tool.
    pub fn coverlet(runner: Arc<dyn CommandRunner>, tool_directory: impl Into<PathBuf>) -> CoreResult<Self> {
        let minimum_version = Version::parse(MINIMUM_COVERLET_VERSION)
            .map_err(|e| CoreError::parse(format!("Invalid minimum version: {}", e)))?;
        Ok(Self {
            runner,
            dotnet: PathBuf::from("dotnet"),
            tool_name: COVERLET_TOOL_NAME.to_string(),
            tool_directory: tool_directory.into(),
            minimum_version,
            state: RwLock::new(ToolVersionState::default()),
            install_lock: Mutex::new(()),
        })
    }

    pub fn tool_directory(&self) -> &Path {
        &self.tool_directory
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ToolVersionState {
        self.state.read().await.clone()
    }

    /// Resolved executable; `ToolNotReady` until `ensure_ready` succeeded.
    pub async fn executable_path(&self) -> CoreResult<PathBuf> {
        self.state
            .read()
            .await
            .executable_path
            .clone()
            .ok_or_else(|| CoreError::tool_not_ready(format!("{} is not installed", self.tool_name)))
    }

    /// Query the installed version. Failures count as not installed.
    pub async fn query_version(&self) -> Option<Version> {
        let request = ProcessRequest::new(
            &self.dotnet,
            vec![
                "tool".to_string(),
                "list".to_string(),
                "--tool-path".to_string(),
                self.tool_directory.to_string_lossy().into_owned(),
            ],
            PACKAGE_COMMAND_TIMEOUT_SECS,
        );
        match self.runner.run(&request, &CancellationToken::new()).await {
            Ok(output) if output.success() => parse_tool_list_version(&output.output, &self.tool_name),
            Ok(output) => {
                warn!(
                    "[Installer] Version query exited with {}: {}",
                    output.exit_code,
                    output.output.trim()
                );
                None
            }
            Err(e) => {
                warn!("[Installer] Version query failed: {}", e);
                None
            }
        }
    }

    /// Make sure the tool is installed at or above the minimum version.
    pub async fn ensure_ready(&self) -> CoreResult<ToolVersionState> {
        let _install = self.install_lock.lock().await;
        if let Err(e) = tokio::fs::create_dir_all(&self.tool_directory).await {
            warn!(
                "[Installer] Could not create tool folder {}: {}",
                self.tool_directory.display(),
                e
            );
        }

        let mut version = self.query_version().await;
        let action = required_action(version.as_ref(), &self.minimum_version);
        match action {
            InstallAction::None => {
                debug!("[Installer] {} {:?} is up to date", self.tool_name, version);
            }
            InstallAction::Install | InstallAction::Update => {
                if let Err(e) = self.install_or_update(action).await {
                    error!("[Installer] {}", e);
                    return Err(e);
                }
                version = self.query_version().await;
                if required_action(version.as_ref(), &self.minimum_version) != InstallAction::None {
                    let err = CoreError::tool_not_ready(format!(
                        "{} still reports version {:?} after {:?}",
                        self.tool_name, version, action
                    ));
                    error!("[Installer] {}", err);
                    return Err(err);
                }
            }
        }

        let executable_path = self.find_executable().ok_or_else(|| {
            CoreError::tool_not_ready(format!(
                "{} executable not found in {}",
                self.tool_name,
                self.tool_directory.display()
            ))
        })?;

        let mut state = self.state.write().await;
        state.current_version = version.map(|v| v.to_string());
        state.executable_path = Some(executable_path);
        info!(
            "[Installer] {} ready: {:?} at {:?}",
            self.tool_name, state.current_version, state.executable_path
        );
        Ok(state.clone())
    }

    async fn install_or_update(&self, action: InstallAction) -> CoreResult<()> {
        let verb = match action {
            InstallAction::Update => "update",
            _ => "install",
        };
        let request = ProcessRequest::new(
            &self.dotnet,
            vec![
                "tool".to_string(),
                verb.to_string(),
                self.tool_name.clone(),
                "--verbosity".to_string(),
                "normal".to_string(),
                "--version".to_string(),
                self.minimum_version.to_string(),
                "--tool-path".to_string(),
                self.tool_directory.to_string_lossy().into_owned(),
            ],
            PACKAGE_COMMAND_TIMEOUT_SECS,
        );
        info!("[Installer] {} {} {}", verb, self.tool_name, self.minimum_version);

        let output = self
            .runner
            .run(&request, &CancellationToken::new())
            .await
            .map_err(|e| CoreError::tool_not_ready(format!("{} {} failed: {}", verb, self.tool_name, e)))?;
        if !output.success() {
            return Err(CoreError::tool_not_ready(format!(
                "{} {} exited with {}: {}",
                verb,
                self.tool_name,
                output.exit_code,
                output.output.trim()
            )));
        }
        info!("[Installer] {}", output.output.trim());
        Ok(())
    }

    fn find_executable(&self) -> Option<PathBuf> {
        let directory = glob::Pattern::escape(&self.tool_directory.to_string_lossy());
        let pattern = PathBuf::from(directory).join(format!("{}*", COVERLET_EXECUTABLE));
        glob::glob(&pattern.to_string_lossy())
            .ok()?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .find(|path| {
                path.file_name()
                    .map(|n| {
                        let n = n.to_string_lossy().to_ascii_lowercase();
                        n == COVERLET_EXECUTABLE || n == format!("{}.exe", COVERLET_EXECUTABLE)
                    })
                    .unwrap_or(false)
            })
    }
}
