//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use taskloop_llm::ProviderConfig;
use taskloop_tools::ReliabilityConfig;

use crate::utils::paths::default_tasks_dir;

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider connection
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Which tool categories run without asking
    #[serde(default)]
    pub auto_approval: AutoApprovalSettings,
    /// Token ceiling used to decide when history is truncated
    #[serde(default)]
    pub context_window: ContextWindowSettings,
    /// Tool-call retry and pattern analysis
    #[serde(default)]
    pub retry: ReliabilityConfig,
    /// Consecutive model mistakes before asking the user for guidance
    #[serde(default = "default_max_consecutive_mistakes")]
    pub max_consecutive_mistakes: u32,
    /// Delay before a history mutation is written to disk
    #[serde(default = "default_history_write_debounce_ms")]
    pub history_write_debounce_ms: u64,
    /// Where task directories are created; defaults to ~/.taskloop/tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_dir: Option<PathBuf>,
}

fn default_max_consecutive_mistakes() -> u32 {
    3
}

fn default_history_write_debounce_ms() -> u64 {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            auto_approval: AutoApprovalSettings::default(),
            context_window: ContextWindowSettings::default(),
            retry: ReliabilityConfig::default(),
            max_consecutive_mistakes: default_max_consecutive_mistakes(),
            history_write_debounce_ms: default_history_write_debounce_ms(),
            tasks_dir: None,
        }
    }
}

/// Provider connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; falls back to ANTHROPIC_API_KEY when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            proxy: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderSettings {
    /// Provider config with the API key resolved from the environment if needed.
    pub fn resolve(&self) -> ProviderConfig {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        ProviderConfig {
            api_key,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            proxy: self.proxy.clone(),
            request_timeout_secs: Some(self.request_timeout_secs),
        }
    }
}

/// Auto-approval by tool category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoApprovalSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Auto-approved requests before the user must confirm continuing
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_true")]
    pub read_files: bool,
    #[serde(default)]
    pub edit_files: bool,
    #[serde(default)]
    pub execute_commands: bool,
}

fn default_max_requests() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for AutoApprovalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: default_max_requests(),
            read_files: true,
            edit_files: false,
            execute_commands: false,
        }
    }
}

/// Reserved buffer for one context-window size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowTier {
    pub context_window: u64,
    pub reserved_buffer: u64,
}

/// Token ceiling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowSettings {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<ContextWindowTier>,
    /// Share of an untiered window kept free
    #[serde(default = "default_reserved_ratio")]
    pub default_reserved_ratio: f64,
    /// Absolute buffer kept free for an untiered window
    #[serde(default = "default_reserved_floor")]
    pub default_reserved_floor: u64,
}

fn default_tiers() -> Vec<ContextWindowTier> {
    vec![
        ContextWindowTier {
            context_window: 64_000,
            reserved_buffer: 27_000,
        },
        ContextWindowTier {
            context_window: 128_000,
            reserved_buffer: 30_000,
        },
        ContextWindowTier {
            context_window: 200_000,
            reserved_buffer: 40_000,
        },
    ]
}

fn default_reserved_ratio() -> f64 {
    0.2
}

fn default_reserved_floor() -> u64 {
    40_000
}

impl Default for ContextWindowSettings {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            default_reserved_ratio: default_reserved_ratio(),
            default_reserved_floor: default_reserved_floor(),
        }
    }
}

impl ContextWindowSettings {
    /// Largest token count a request may reach before history is truncated.
    ///
    /// A tier matching the window exactly wins. Otherwise the larger of
    /// `window - floor` and `window * (1 - ratio)` is used, which keeps very
    /// small windows usable.
    pub fn max_allowed_tokens(&self, context_window: u64) -> u64 {
        if let Some(tier) = self
            .tiers
            .iter()
            .find(|t| t.context_window == context_window)
        {
            return context_window.saturating_sub(tier.reserved_buffer);
        }
        let by_floor = context_window.saturating_sub(self.default_reserved_floor);
        let by_ratio = (context_window as f64 * (1.0 - self.default_reserved_ratio)) as u64;
        by_floor.max(by_ratio)
    }
}

/// Command-line overrides (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub auto_approve: Option<bool>,
    pub max_requests: Option<u32>,
    pub tasks_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(model) = update.model {
            self.provider.model = model;
        }
        if let Some(enabled) = update.auto_approve {
            self.auto_approval.enabled = enabled;
        }
        if let Some(max) = update.max_requests {
            self.auto_approval.max_requests = max;
        }
        if let Some(dir) = update.tasks_dir {
            self.tasks_dir = Some(dir);
        }
    }

    /// Tasks directory, falling back to ~/.taskloop/tasks
    pub fn resolved_tasks_dir(&self) -> crate::utils::error::AppResult<PathBuf> {
        match &self.tasks_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_tasks_dir(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.model.trim().is_empty() {
            return Err("provider.model must not be empty".to_string());
        }

        if self.provider.max_tokens == 0 {
            return Err("provider.max_tokens must be greater than 0".to_string());
        }

        if self.auto_approval.max_requests == 0 {
            return Err("auto_approval.max_requests must be at least 1".to_string());
        }

        if !(0.0..1.0).contains(&self.context_window.default_reserved_ratio) {
            return Err(format!(
                "Invalid context_window.default_reserved_ratio: {}. Must be in [0, 1)",
                self.context_window.default_reserved_ratio
            ));
        }

        if let Some(tier) = self
            .context_window
            .tiers
            .iter()
            .find(|t| t.reserved_buffer >= t.context_window)
        {
            return Err(format!(
                "Reserved buffer {} leaves nothing of a {} token window",
                tier.reserved_buffer, tier.context_window
            ));
        }

        if self.retry.default_max_attempts == 0 {
            return Err("retry.default_max_attempts must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.retry.suggestion_min_success_rate) {
            return Err("retry.suggestion_min_success_rate must be in [0, 1]".to_string());
        }

        if self.max_consecutive_mistakes == 0 {
            return Err("max_consecutive_mistakes must be at least 1".to_string());
        }

        Ok(())
    }
}
