//! Configuration data structures for markpilot.
//!
//! This module defines the schema for the application settings: the local
//! daemon, provider credentials, the completion and chat features, the result
//! cache, spending limits, logging and persisted state.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Local HTTP daemon settings (host, port).
    #[serde(default)]
    pub server: ServerConfig,

    /// Credentials and endpoints for every supported provider.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Inline completion settings.
    #[serde(default)]
    pub completions: CompletionsConfig,

    /// Chat settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Spending limits.
    #[serde(default)]
    pub usage: UsageConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where usage history and chat history are persisted.
    #[serde(default)]
    pub state: StateConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8471`
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The supported language-model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Human readable provider name used in notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::Ollama => "Ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and transport settings for one provider.
///
/// The key is wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize, Default, Zeroize)]
#[zeroize(drop)]
pub struct ProviderCredentials {
    /// API key. Ollama does not require one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Overrides the provider's default base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

// Custom Debug impl that never logs keys
impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Settings shared by all provider adapters plus per-provider credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderCredentials,

    #[serde(default)]
    pub openrouter: ProviderCredentials,

    #[serde(default)]
    pub ollama: ProviderCredentials,

    /// Request timeout in seconds.
    /// Default: `30`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of retries for rate-limited or unavailable responses.
    /// Default: `2`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ProvidersConfig {
    pub fn credentials(&self, kind: ProviderKind) -> &ProviderCredentials {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::OpenRouter => &self.openrouter,
            ProviderKind::Ollama => &self.ollama,
        }
    }
}

/// Settings for inline completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsConfig {
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default: `openai`
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Default: `gpt-4o-mini`
    #[serde(default = "default_model")]
    pub model: String,

    /// Default: `64`
    #[serde(default = "default_completion_max_tokens")]
    pub max_tokens: u32,

    /// Default: `0.0`
    #[serde(default)]
    pub temperature: f32,

    /// Quiet period before a keystroke burst is sent, in milliseconds.
    /// Default: `500`
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Number of characters of context kept on each side of the cursor.
    /// Default: `512`
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

/// Settings for the chat feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default: `openai`
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Default: `gpt-4o-mini`
    #[serde(default = "default_model")]
    pub model: String,

    /// Default: `4096`
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    /// Default: `0.5`
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,
}

/// Configuration for the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled at startup. Can be toggled at runtime.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional cap on stored results; least recently used entries are evicted.
    /// Default: unbounded
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Spending limits checked against the usage ledger.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsageConfig {
    /// Calls are refused once this month's spend reaches this amount (USD).
    /// Default: no limit
    #[serde(default)]
    pub monthly_limit_usd: Option<f64>,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Location of the persisted usage and chat state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Default: `~/.markpilot/state.json`
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderCredentials::default(),
            openrouter: ProviderCredentials::default(),
            ollama: ProviderCredentials::default(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for CompletionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_completion_max_tokens(),
            temperature: 0.0,
            wait_ms: default_wait_ms(),
            window_size: default_window_size(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: default_model(),
            max_tokens: default_chat_max_tokens(),
            temperature: default_chat_temperature(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8471
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_max_tokens() -> u32 {
    64
}

fn default_chat_max_tokens() -> u32 {
    4096
}

fn default_chat_temperature() -> f32 {
    0.5
}

fn default_wait_ms() -> u64 {
    500
}

fn default_window_size() -> usize {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

pub(crate) fn home_path(file: &str) -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".markpilot")
        .join(file)
        .to_string_lossy()
        .to_string()
}

fn default_state_path() -> String {
    home_path("state.json")
}
