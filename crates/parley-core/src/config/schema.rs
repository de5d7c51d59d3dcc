//! Configuration schema.
//!
//! Hierarchy: `Config` → `AiConfig`, `ProvidersConfig`, `BackendConfig`,
//! `MockConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{ProviderKind, DEFAULT_FREE_CHAT_LIMIT, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Prompt prepended to every conversation sent to a provider.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. You have access to the \
conversation history and should provide contextual responses that reference previous messages \
when relevant. Maintain conversation continuity and build upon previous topics discussed.";

/// Azure API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.parley/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub ai: AiConfig,
    pub providers: ProvidersConfig,
    pub backend: BackendConfig,
    pub mock: MockConfig,
}

impl Config {
    /// The selected provider. Unknown names fall back to Azure with a warning.
    pub fn provider_kind(&self) -> ProviderKind {
        match self.ai.provider.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("{e}; falling back to {}", ProviderKind::default());
                ProviderKind::default()
            }
        }
    }
}

// ─────────────────────────────────────────────
// AI
// ─────────────────────────────────────────────

/// Generation settings shared by every provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiConfig {
    /// `azure`, `openai` or `gemini`.
    pub provider: String,
    /// Model override. Empty means the provider's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Longest silence tolerated between two streamed chunks.
    pub stream_idle_timeout_secs: u64,
    /// Whole-request timeout for non-streaming calls.
    pub request_timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default().to_string(),
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stream_idle_timeout_secs: 60,
            request_timeout_secs: 120,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Credentials for a key + base-URL provider (OpenAI, Gemini).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Azure OpenAI deployment settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureConfig {
    pub api_key: String,
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub deployment_name: String,
    pub api_version: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            deployment_name: String::new(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        }
    }
}

impl AzureConfig {
    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint.trim().is_empty() {
            missing.push("endpoint");
        }
        if self.api_key.trim().is_empty() {
            missing.push("apiKey");
        }
        if self.deployment_name.trim().is_empty() {
            missing.push("deploymentName");
        }
        missing
    }

    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Per-provider credentials.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub azure: AzureConfig,
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

// ─────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────

/// How the chat store picks between the hosted backend and the mirror.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Probe the backend and fall back to the mirror when it is unreachable.
    #[default]
    Auto,
    /// Always use the hosted backend; failures surface as errors.
    Remote,
    /// Always use the in-memory mirror.
    Mirror,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreMode::Auto => "auto",
            StoreMode::Remote => "remote",
            StoreMode::Mirror => "mirror",
        })
    }
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(StoreMode::Auto),
            "remote" => Ok(StoreMode::Remote),
            "mirror" | "memory" => Ok(StoreMode::Mirror),
            other => Err(format!("unknown store mode '{other}'")),
        }
    }
}

/// Hosted backend (PostgREST-style BaaS) connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`. Empty disables the remote.
    pub url: String,
    pub anon_key: String,
    /// Session token from a previous sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Owner of the chats and subscription row.
    pub user_id: String,
    pub mode: StoreMode,
    /// How long a connectivity probe result is trusted.
    pub probe_ttl_secs: u64,
    /// Ask the backend's `check_chat_limit` procedure instead of reading the row.
    pub use_quota_rpc: bool,
    pub free_chat_limit: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            access_token: None,
            user_id: "local-user".to_string(),
            mode: StoreMode::Auto,
            probe_ttl_secs: 30,
            use_quota_rpc: false,
            free_chat_limit: DEFAULT_FREE_CHAT_LIMIT,
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

// ─────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────

/// Pacing of the mock responder's streamed words.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 150,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
