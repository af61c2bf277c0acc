//! Options Models
//!
//! User options consulted by the lifecycle policy, and the per-project
//! defaults handed to the host's test-operation collaborator.

use serde::{Deserialize, Serialize};

use fine_coverage_core::ProjectSettings;

/// Options stored in options.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppOptions {
    /// Collect coverage after the host has run tests in parallel
    pub run_in_parallel: bool,
    /// Still collect coverage when tests failed
    pub run_when_tests_fail: bool,
    /// Only collect coverage when more than this many tests ran
    pub run_when_tests_exceed: u64,
    /// Prefer the alternate (built-in) collector
    pub ms_code_coverage: bool,
    /// Defaults for every project (enabled flag, timeout, filters)
    #[serde(flatten)]
    pub project_defaults: ProjectSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            run_in_parallel: false,
            run_when_tests_fail: true,
            run_when_tests_exceed: 0,
            ms_code_coverage: false,
            project_defaults: ProjectSettings::default(),
        }
    }
}

/// Options update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OptionsUpdate {
    pub enabled: Option<bool>,
    pub run_in_parallel: Option<bool>,
    pub run_when_tests_fail: Option<bool>,
    pub run_when_tests_exceed: Option<u64>,
    pub ms_code_coverage: Option<bool>,
    pub cover_tool_timeout: Option<u64>,
    pub exclude: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub include_test_assembly: Option<bool>,
}

impl AppOptions {
    /// Whether coverage is globally enabled
    pub fn enabled(&self) -> bool {
        self.project_defaults.enabled
    }

    /// Settings handed to each new coverage project
    pub fn project_settings(&self) -> ProjectSettings {
        self.project_defaults.clone()
    }

    /// Apply a partial update to the options
    pub fn apply_update(&mut self, update: OptionsUpdate) {
        if let Some(enabled) = update.enabled {
            self.project_defaults.enabled = enabled;
        }
        if let Some(parallel) = update.run_in_parallel {
            self.run_in_parallel = parallel;
        }
        if let Some(run_when_fail) = update.run_when_tests_fail {
            self.run_when_tests_fail = run_when_fail;
        }
        if let Some(threshold) = update.run_when_tests_exceed {
            self.run_when_tests_exceed = threshold;
        }
        if let Some(ms) = update.ms_code_coverage {
            self.ms_code_coverage = ms;
        }
        if let Some(timeout) = update.cover_tool_timeout {
            self.project_defaults.cover_tool_timeout = timeout;
        }
        if let Some(exclude) = update.exclude {
            self.project_defaults.exclude = exclude;
        }
        if let Some(include) = update.include {
            self.project_defaults.include = include;
        }
        if let Some(include_test_assembly) = update.include_test_assembly {
            self.project_defaults.include_test_assembly = include_test_assembly;
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), String> {
        if self.project_defaults.cover_tool_timeout == 0 {
            return Err("coverToolTimeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AppOptions::default();
        assert!(options.enabled());
        assert!(!options.run_in_parallel);
        assert!(options.run_when_tests_fail);
        assert_eq!(options.run_when_tests_exceed, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_camel_case_json() {
        let options: AppOptions = serde_json::from_str(
            r#"{"runInParallel":true,"runWhenTestsExceed":10,"msCodeCoverage":true,"coverToolTimeout":45,"exclude":["[*]Gen*"]}"#,
        )
        .unwrap();
        assert!(options.run_in_parallel);
        assert_eq!(options.run_when_tests_exceed, 10);
        assert!(options.ms_code_coverage);
        assert_eq!(options.project_defaults.cover_tool_timeout, 45);
        assert_eq!(options.project_defaults.exclude, vec!["[*]Gen*"]);
        assert!(options.run_when_tests_fail);
    }

    #[test]
    fn test_apply_update() {
        let mut options = AppOptions::default();
        options.apply_update(OptionsUpdate {
            run_when_tests_fail: Some(false),
            cover_tool_timeout: Some(30),
            ..Default::default()
        });
        assert!(!options.run_when_tests_fail);
        assert_eq!(options.project_settings().cover_tool_timeout, 30);
        assert!(!options.run_in_parallel);
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut options = AppOptions::default();
        options.project_defaults.cover_tool_timeout = 0;
        assert!(options.validate().is_err());
    }
}
