//! Application Paths
//!
//! Resolves the per-user app-data folder and the tool folders beneath it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Environment variable overriding the app-data folder.
pub const APP_DATA_ENV: &str = "FCC_APP_DATA";

const APP_DATA_FOLDER: &str = "FineCodeCoverage";

/// App-data folder (`$FCC_APP_DATA`, else `<local data>/FineCodeCoverage`)
pub fn app_data_dir() -> AppResult<PathBuf> {
    if let Some(dir) = std::env::var_os(APP_DATA_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DATA_FOLDER))
        .ok_or_else(|| AppError::config("Could not determine local data directory"))
}

/// Options file inside an app-data folder
pub fn options_path(app_data: &Path) -> PathBuf {
    app_data.join("options.json")
}

/// Coverage tool install folder
pub fn coverlet_dir(app_data: &Path) -> PathBuf {
    app_data.join("coverlet")
}

/// Alternate collector package folder
pub fn ms_code_coverage_dir(app_data: &Path) -> PathBuf {
    app_data.join("msCodeCoverage")
}

/// Unified report output folder
pub fn reports_dir(app_data: &Path) -> PathBuf {
    app_data.join("reports")
}

/// Alternate collector test adapter path, used for `%fcc_testadapter%`
pub fn ms_test_adapter_path(ms_code_coverage_dir: &Path) -> PathBuf {
    ms_code_coverage_dir.join("build").join("netstandard1.0")
}

/// Compatibility shim copied beside test binaries
pub fn ms_shim_path(ms_code_coverage_dir: &Path) -> PathBuf {
    ms_test_adapter_path(ms_code_coverage_dir)
        .join("CodeCoverage")
        .join("coreclr")
        .join("Microsoft.VisualStudio.CodeCoverage.Shim.dll")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
