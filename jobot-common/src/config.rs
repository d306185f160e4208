//! Configuration management for Jobot.
//!
//! The gateway and the chat client share one configuration directory at
//! `~/.jobot/` (`config.json`, plus optional `secrets.json`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENAI_API_KEY` (or legacy `OPEN_API_KEY`) → secrets.openai_api_key
//! - `OPENAI_BASE_URL` → completion.base_url
//! - `JOBOT_MODEL` → completion.model
//! - `SUPABASE_URL` / `NEXT_PUBLIC_SUPABASE_URL` → auth.supabase_url
//! - `SUPABASE_ANON_KEY` / `NEXT_PUBLIC_SUPABASE_ANON_KEY` → secrets.supabase_anon_key
//! - `JOBOT_REQUIRE_SESSION` → auth.require_session
//! - `JOBOT_BIND_ADDRESS` → network.bind
//! - `JOBOT_PORT` → network.port
//! - `JOBOT_STREAM` → chat.stream
//! - `JOBOT_ENDPOINT` → client.endpoint
//! - `JOBOT_SESSION_TOKEN` → client.session_token
//! - `JOBOT_LOG_LEVEL` → observability.log_level

use crate::error::Error;
use crate::util::parse_bool_flag;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// System prompt that opens every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Jobot, a helpful and versatile AI created by Jovian using state-of-the-art ML models and APIs.";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".jobot"),
        |dirs| dirs.home_dir().join(".jobot"),
    )
}

// ============================================================================
// Network
// ============================================================================

/// Listen address of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default "127.0.0.1" (local only).
    #[serde(default = "default_bind_address")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

// ============================================================================
// Completion API
// ============================================================================

/// Upstream completion API and the fixed generation parameters sent with
/// every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Whole-request timeout for the upstream call, in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://models.github.ai/inference".into()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    1.0
}

fn default_top_p() -> f64 {
    1.0
}

fn default_completion_timeout() -> u64 {
    300
}

// ============================================================================
// Secrets
// ============================================================================

/// Credentials, usually kept in `secrets.json` or the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Completion API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Auth provider public (anonymous) key
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
}

// ============================================================================
// Auth
// ============================================================================

/// Session gating of the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Reject chat requests without a valid provider session
    #[serde(default)]
    pub require_session: bool,

    /// Auth provider base URL (e.g. `https://<project>.supabase.co`)
    #[serde(default)]
    pub supabase_url: Option<String>,

    /// Cookie carrying the session access token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    #[serde(default = "default_auth_timeout")]
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_session: false,
            supabase_url: None,
            session_cookie: default_session_cookie(),
            timeout_secs: default_auth_timeout(),
        }
    }
}

fn default_session_cookie() -> String {
    "sb-access-token".into()
}

fn default_auth_timeout() -> u64 {
    10
}

// ============================================================================
// Chat endpoint
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Default response mode; a request may override it with `"stream"`.
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Maximum accepted request body, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            stream: true,
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_body_limit() -> usize {
    1024 * 1024
}

// ============================================================================
// Chat client
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full URL of the gateway's chat endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Session token forwarded to the gateway as a cookie
    #[serde(default)]
    pub session_token: Option<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            session_token: None,
            system_prompt: default_system_prompt(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3000/api/chat".into()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration shared by the gateway and the chat client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default directory.
    ///
    /// Missing files are not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load `config.json` and `secrets.json` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = crate::config_loader::load_modular_config(Some(dir.to_path_buf()))?;
        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|key| var(key));

        if let Some(key) = first(&["OPENAI_API_KEY", "OPEN_API_KEY"]) {
            self.secrets.openai_api_key = Some(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.completion.base_url = url;
        }
        if let Some(model) = var("JOBOT_MODEL") {
            self.completion.model = model;
        }
        if let Some(url) = first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
            self.auth.supabase_url = Some(url);
        }
        if let Some(key) = first(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]) {
            self.secrets.supabase_anon_key = Some(key);
        }
        if let Some(flag) = var("JOBOT_REQUIRE_SESSION").as_deref().and_then(parse_bool_flag) {
            self.auth.require_session = flag;
        }
        if let Some(bind) = var("JOBOT_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = var("JOBOT_PORT").and_then(|p| p.parse().ok()) {
            self.network.port = port;
        }
        if let Some(flag) = var("JOBOT_STREAM").as_deref().and_then(parse_bool_flag) {
            self.chat.stream = flag;
        }
        if let Some(endpoint) = var("JOBOT_ENDPOINT") {
            self.client.endpoint = endpoint;
        }
        if let Some(token) = var("JOBOT_SESSION_TOKEN") {
            self.client.session_token = Some(token);
        }
        if let Some(level) = var("JOBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// Check that the gateway has the credentials it needs.
    ///
    /// Only presence is checked; the providers judge validity.
    pub fn validate_gateway(&self) -> crate::error::Result<()> {
        let mut missing = Vec::new();

        if !has_value(&self.secrets.openai_api_key) {
            missing.push("completion API key (OPENAI_API_KEY)");
        }
        if self.auth.require_session {
            if !has_value(&self.auth.supabase_url) {
                missing.push("auth provider URL (SUPABASE_URL)");
            }
            if !has_value(&self.secrets.supabase_anon_key) {
                missing.push("auth provider key (SUPABASE_ANON_KEY)");
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing {}", missing.join(", "))))
        }
    }

    /// Full URL of the upstream chat completions endpoint.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.completion.base_url.trim_end_matches('/')
        )
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
