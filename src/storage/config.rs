//! JSON Configuration Management
//!
//! Handles reading and writing the application configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Load ~/.taskloop/config.json, creating it with defaults if missing
    pub fn new() -> AppResult<Self> {
        Self::load(&config_path()?)
    }

    /// Load the config at `path`, creating it with defaults if missing
    pub fn load(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            let default_config = AppConfig::default();
            Self::save_to_file(path, &default_config)?;
            tracing::info!(path = %path.display(), "created default config");
            default_config
        };

        Ok(Self {
            config_path: path.to_path_buf(),
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Apply overrides for this run only; nothing is written back.
    pub fn with_overrides(mut self, update: SettingsUpdate) -> AppResult<Self> {
        self.config.apply_update(update);
        self.config.validate().map_err(AppError::validation)?;
        Ok(self)
    }

    /// Update the configuration with a partial update and persist it
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<AppConfig> {
        self.config.apply_update(update);
        self.save()?;
        Ok(self.config.clone())
    }

    fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }
}
