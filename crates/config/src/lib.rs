//! Configuration loading, validation, and management for Deckhand.
//!
//! Loads configuration from `~/.deckhand/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use deckhand_core::LlmConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deckhand/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible model endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Tool-calling loop limits
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Tool family configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("orchestration", &self.orchestration)
            .field("gateway", &self.gateway)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Model calls allowed per orchestration call
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Largest serialized tool result placed back into the conversation
    #[serde(default = "default_max_tool_result_bytes")]
    pub max_tool_result_bytes: usize,

    /// Characters of the original kept when a result is truncated
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_tool_result_bytes() -> usize {
    9_500_000
}
fn default_preview_chars() -> usize {
    2000
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_tool_result_bytes: default_max_tool_result_bytes(),
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub todo: TodoConfig,

    #[serde(default)]
    pub disk: DiskConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoConfig {
    /// Sessions kept before the least recently updated one is evicted
    #[serde(default = "default_todo_max_sessions")]
    pub max_sessions: usize,
}

fn default_todo_max_sessions() -> usize {
    1024
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_todo_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Directory holding one subdirectory per disk id
    #[serde(default = "default_disk_root")]
    pub root: PathBuf,
}

fn default_disk_root() -> PathBuf {
    AppConfig::config_dir().join("disks")
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root: default_disk_root(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// API key; the image family is only registered when one is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_image_size")]
    pub size: String,
}

fn default_image_model() -> String {
    "gpt-image-1".into()
}
fn default_image_size() -> String {
    "1024x1024".into()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_image_model(),
            size: default_image_size(),
        }
    }
}

impl std::fmt::Debug for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// API key; the browser family is only registered when one is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_browser_api_url")]
    pub api_url: String,

    /// Deadline for one browser task
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_browser_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_browser_api_url() -> String {
    "https://api.browser-use.com/api/v1".into()
}
fn default_browser_timeout() -> u64 {
    300
}
fn default_browser_poll_interval() -> u64 {
    2000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_browser_api_url(),
            timeout_secs: default_browser_timeout(),
            poll_interval_ms: default_browser_poll_interval(),
        }
    }
}

impl std::fmt::Debug for BrowserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deckhand/config.toml).
    ///
    /// Also checks environment variables:
    /// - `DECKHAND_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `DECKHAND_API_URL`, `DECKHAND_MODEL`
    /// - `DECKHAND_IMAGE_API_KEY`, `DECKHAND_BROWSER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("DECKHAND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("DECKHAND_API_URL") {
            config.api_url = url;
        }

        if let Ok(model) = std::env::var("DECKHAND_MODEL") {
            config.default_model = model;
        }

        if config.tools.image.api_key.is_none() {
            config.tools.image.api_key = std::env::var("DECKHAND_IMAGE_API_KEY")
                .ok()
                .or_else(|| config.api_key.clone());
        }

        if config.tools.browser.api_key.is_none() {
            config.tools.browser.api_key = std::env::var("DECKHAND_BROWSER_API_KEY").ok();
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deckhand")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestration.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_iterations must be at least 1".into(),
            ));
        }

        if self.orchestration.max_tool_result_bytes <= self.orchestration.preview_chars {
            return Err(ConfigError::ValidationError(
                "orchestration.max_tool_result_bytes must exceed preview_chars".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Per-call model settings derived from the defaults.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig::new(&self.default_model)
            .with_temperature(self.default_temperature)
            .with_max_tokens(self.default_max_tokens)
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            orchestration: OrchestrationConfig::default(),
            gateway: GatewayConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
