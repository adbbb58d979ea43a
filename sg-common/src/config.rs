//! Configuration loading and resolution
//!
//! Bootstrap configuration comes from a TOML file. Resolution priority:
//! 1. Command-line argument (handled by the binary via clap)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not fatal: the service logs a warning and starts
//! with compiled defaults. A TOML file that exists but cannot be parsed is a
//! configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "SCOPEGUARD_CONFIG";

/// Environment variable carrying the language-model API key
pub const MODEL_API_KEY_ENV: &str = "SCOPEGUARD_MODEL_API_KEY";

/// Complete bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            model: ModelConfig::default(),
            mailbox: MailboxConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Hosted language-model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Anthropic Messages API
    Anthropic,
    /// Any OpenAI-compatible chat-completions endpoint (OpenAI, Groq, ...)
    Openai,
}

/// Language-model client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: ModelProvider,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the provider base URL (tests, proxies)
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key; the environment variable takes precedence
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,

    /// Output-token budget for classification calls
    #[serde(default = "default_classification_max_tokens")]
    pub classification_max_tokens: u32,

    /// Output-token budget for reply drafting
    #[serde(default = "default_response_max_tokens")]
    pub response_max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            timeout_secs: default_model_timeout_secs(),
            classification_max_tokens: default_classification_max_tokens(),
            response_max_tokens: default_response_max_tokens(),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Mailbox provider (Gmail) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_mailbox_base_url")]
    pub base_url: String,

    /// OAuth2 token endpoint used for refresh-token grants
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// OAuth2 client id; refresh is disabled when unset
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Maximum messages listed per ingestion call
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Stored body length cap, in characters
    #[serde(default = "default_body_max_chars")]
    pub body_max_chars: usize,

    #[serde(default = "default_mailbox_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_mailbox_base_url(),
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            page_size: default_page_size(),
            body_max_chars: default_body_max_chars(),
            timeout_secs: default_mailbox_timeout_secs(),
        }
    }
}

impl MailboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Refresh-token grants need both halves of the OAuth client credentials
    pub fn refresh_enabled(&self) -> bool {
        self.client_id.as_deref().is_some_and(is_valid_key)
            && self.client_secret.as_deref().is_some_and(is_valid_key)
    }
}

/// Mailbox monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between monitor ticks
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scopeguard").join("scopeguard.db"))
        .unwrap_or_else(|| PathBuf::from("./scopeguard_data/scopeguard.db"))
}

fn default_bind_address() -> String {
    "127.0.0.1:5780".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider() -> ModelProvider {
    ModelProvider::Anthropic
}

fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}

fn default_model_timeout_secs() -> u64 {
    30
}

fn default_classification_max_tokens() -> u32 {
    500
}

fn default_response_max_tokens() -> u32 {
    1000
}

fn default_mailbox_base_url() -> String {
    "https://gmail.googleapis.com".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_body_max_chars() -> usize {
    10_000
}

fn default_mailbox_timeout_secs() -> u64 {
    30
}

fn default_monitor_interval_secs() -> u64 {
    30
}

/// Resolve which TOML file to read
///
/// Priority: explicit path (CLI) → `SCOPEGUARD_CONFIG` → user config dir
/// (`~/.config/scopeguard/config.toml` on Linux). Returns `None` when no
/// candidate applies, in which case compiled defaults are used.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("scopeguard").join("config.toml"))
        .filter(|p| p.exists())
}

impl TomlConfig {
    /// Load configuration from an optional TOML path
    ///
    /// Missing file → warning + defaults. Unreadable or malformed file → error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file found, using compiled defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }
}

/// Resolve the language-model API key
///
/// **Priority:** ENV → TOML. Warns when both sources are set.
pub fn resolve_model_api_key(model: &ModelConfig) -> Result<String> {
    let env_key = std::env::var(MODEL_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = model.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Model API key found in both {} and TOML config. Using environment (highest priority).",
            MODEL_API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("Model API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Model API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Model API key not configured. Set {} or [model] api_key in the TOML config",
        MODEL_API_KEY_ENV
    )))
}

/// Validate a key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
