//! Configuration management for Relay.
//!
//! The gateway reads a single configuration file at `~/.relay/config.json`.
//! A missing file is not an error; defaults apply.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Provider API Keys (→ secrets.*)
//! - `GEMINI_API_KEY` → secrets.gemini
//! - `LLAMA_API_KEY` → secrets.llama
//! - `CLAUDE_API_KEY` → secrets.claude
//! - `CHATGPT_API_KEY` → secrets.chatgpt
//!
//! ## Session Store
//! - `REDIS_ADDR` → store.url (`host:port` or `redis://...`)
//! - `RELAY_STORE_BACKEND` → store.backend
//!
//! ## Server
//! - `RELAY_BIND_ADDRESS` → server.host
//! - `RELAY_PORT` → server.port
//!
//! ## Misc
//! - `RELAY_LOG_LEVEL` / `RELAY_LOG_FORMAT` → observability.*
//! - `RELAY_SYSTEM_PROMPT` → assistant.system_prompt

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// System prompt injected at the start of every new session.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful and friendly AI assistant. Keep your answers concise.";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Server
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// One API key per provider. Absent keys fail at call time, not at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llama: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatgpt: Option<String>,
}

// ============================================================================
// Session Store
// ============================================================================

/// Which session store implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Redis at `store.url`; stateless mode when no url is set.
    Redis,
    /// Process-local map. Transcripts are lost on restart.
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown store backend: {other}"))),
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend name (redis, memory)
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Redis address. Accepts `host:port` or a full `redis://` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Prefix prepended to every session key
    #[serde(default)]
    pub key_prefix: String,

    /// Upper bound for a single store command, in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: None,
            key_prefix: String::new(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    /// Parsed backend. Unknown names fall back to Redis; `validate` reports them.
    pub fn backend(&self) -> StoreBackend {
        self.backend.parse().unwrap_or(StoreBackend::Redis)
    }

    /// Redis connection URL, normalized to the `redis://` scheme.
    pub fn redis_url(&self) -> Option<String> {
        let raw = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        if raw.starts_with("redis://") || raw.starts_with("rediss://") {
            Some(raw.to_string())
        } else {
            Some(format!("redis://{raw}"))
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Per-provider endpoint overrides (`providers.<id>`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverride {
    /// Base URL replacing the provider's public endpoint
    #[serde(
        default,
        rename = "baseURL",
        alias = "base_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,

    /// Upstream model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============================================================================
// Assistant
// ============================================================================

/// Conversation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Seed message for new sessions
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets clamped to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration for the Relay gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Provider API keys
    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Endpoint overrides keyed by provider id
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (the process environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.secrets.gemini = Some(key);
        }
        if let Some(key) = non_empty("LLAMA_API_KEY") {
            self.secrets.llama = Some(key);
        }
        if let Some(key) = non_empty("CLAUDE_API_KEY") {
            self.secrets.claude = Some(key);
        }
        if let Some(key) = non_empty("CHATGPT_API_KEY") {
            self.secrets.chatgpt = Some(key);
        }

        if let Some(addr) = non_empty("REDIS_ADDR") {
            self.store.url = Some(addr);
        }
        if let Some(backend) = non_empty("RELAY_STORE_BACKEND") {
            self.store.backend = backend;
        }

        if let Some(host) = non_empty("RELAY_BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("RELAY_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid RELAY_PORT"),
            }
        }

        if let Some(level) = non_empty("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = non_empty("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(prompt) = non_empty("RELAY_SYSTEM_PROMPT") {
            self.assistant.system_prompt = prompt;
        }
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the API key for a provider id. Empty strings count as absent.
    pub fn get_api_key(&self, provider_id: &str) -> Option<String> {
        let key = match provider_id {
            "gemini" => self.secrets.gemini.as_ref(),
            "llama" => self.secrets.llama.as_ref(),
            "claude" => self.secrets.claude.as_ref(),
            "chatgpt" => self.secrets.chatgpt.as_ref(),
            _ => None,
        };
        key.filter(|k| !k.is_empty()).cloned()
    }

    /// Base URL override for a provider id.
    pub fn provider_base_url(&self, provider_id: &str) -> Option<String> {
        self.providers
            .get(provider_id)
            .and_then(|p| p.base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Upstream model override for a provider id.
    pub fn provider_model(&self, provider_id: &str) -> Option<String> {
        self.providers.get(provider_id).and_then(|p| p.model.clone())
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_store_backend() -> String {
    "redis".into()
}
fn default_store_timeout() -> u64 {
    5
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
