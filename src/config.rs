//! Configuration loading and management for threadwise.
//!
//! Loads settings from `threadwise.toml` with environment variable overrides
//! for sensitive data. Every section has defaults, so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "threadwise.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// LLM provider: "gemini" or "openai"
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash")
    pub model: String,
    /// System persona for the agent
    pub persona: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            persona: "You are a neutral forum analyst. You describe discussions; you never judge or moderate participants.".to_string(),
        }
    }
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub gemini_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Summary cache limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a summary stays valid
    pub ttl_secs: u64,
    /// Entry cap before the oldest entries are evicted
    pub max_entries: usize,
    /// Period of the background expiry sweep
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1000,
            cleanup_interval_secs: 300,
        }
    }
}

/// Request handling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generation attempts per request, including the first
    pub max_attempts: u32,
    /// Bound on the whole uncached request, backoffs included
    pub request_timeout_secs: u64,
    /// Bound on a single generation call
    pub generation_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout_secs: 30,
            generation_timeout_secs: 30,
        }
    }
}

/// Latency tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of request metrics retained
    pub history_size: usize,
    /// Latency target for cache hits
    pub cached_slo_ms: u64,
    /// Latency target for generated summaries
    pub uncached_slo_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            cached_slo_ms: 100,
            uncached_slo_ms: 3000,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from the default location (threadwise.toml in cwd or home).
    ///
    /// Falls back to defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                let mut config = Config::default();
                config.apply_env();
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override API keys from environment variables
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
    }

    /// Reject limits that would disable the cache, monitor or retry loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be at least 1".into()));
        }
        if self.monitor.history_size == 0 {
            return Err(ConfigError::Invalid("monitor.history_size must be at least 1".into()));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::Invalid("pipeline.max_attempts must be at least 1".into()));
        }
        if self.pipeline.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.pipeline.generation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.generation_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("threadwise")
            .join(CONFIG_FILE);
        home_config.exists().then_some(home_config)
    }

    /// Get the API key for the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        match self.agent.provider.as_str() {
            "gemini" => self
                .api
                .gemini_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingApiKey("gemini".to_string())),
            "openai" => self
                .api
                .openai_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingApiKey("openai".to_string())),
            other => Err(ConfigError::MissingApiKey(other.to_string())),
        }
    }
}
