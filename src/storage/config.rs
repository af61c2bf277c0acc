//! JSON Options Management
//!
//! Handles reading and writing the options file and exposes the current
//! options to the lifecycle coordinator through `OptionsProvider`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{AppOptions, OptionsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, options_path};

/// Source of the current options, read once per lifecycle event
pub trait OptionsProvider: Send + Sync {
    fn get(&self) -> AppOptions;
}

impl OptionsProvider for AppOptions {
    fn get(&self) -> AppOptions {
        self.clone()
    }
}

/// Options service backed by `<app data>/options.json`
#[derive(Debug)]
pub struct ConfigService {
    options_path: PathBuf,
    options: AppOptions,
}

impl ConfigService {
    /// Load existing options from the app-data folder or create defaults
    pub fn new(app_data: &Path) -> AppResult<Self> {
        ensure_dir(app_data)?;

        let options_path = options_path(app_data);
        let options = if options_path.exists() {
            Self::load_from_file(&options_path)?
        } else {
            let defaults = AppOptions::default();
            Self::save_to_file(&options_path, &defaults)?;
            defaults
        };

        Ok(Self {
            options_path,
            options,
        })
    }

    fn load_from_file(path: &Path) -> AppResult<AppOptions> {
        let content = fs::read_to_string(path)?;
        let options: AppOptions = serde_json::from_str(&content)?;
        options.validate().map_err(AppError::validation)?;
        Ok(options)
    }

    fn save_to_file(path: &Path, options: &AppOptions) -> AppResult<()> {
        options.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(options)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Current options
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.options_path
    }

    /// Apply a partial update and persist it
    pub fn update(&mut self, update: OptionsUpdate) -> AppResult<AppOptions> {
        let mut next = self.options.clone();
        next.apply_update(update);
        Self::save_to_file(&self.options_path, &next)?;
        self.options = next;
        Ok(self.options.clone())
    }
}

impl OptionsProvider for ConfigService {
    fn get(&self) -> AppOptions {
        self.options.clone()
    }
}
