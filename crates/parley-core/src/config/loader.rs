//! Config loader: reads `~/.parley/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.parley/config.json`
//! 3. Environment variables `PARLEY_<SECTION>__<FIELD>` (override JSON)
//! 4. Vendor variables such as `OPENAI_API_KEY`, only for fields still empty

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let config = read_config_file(&config_path);
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Read and parse the file alone, without env overrides.
pub fn read_config_file(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Supported overrides:
/// - `PARLEY_AI__PROVIDER`, `PARLEY_AI__MODEL`, `PARLEY_AI__MAX_TOKENS`,
///   `PARLEY_AI__TEMPERATURE`, `PARLEY_AI__SYSTEM_PROMPT`
/// - `PARLEY_PROVIDERS__AZURE__{API_KEY,ENDPOINT,DEPLOYMENT_NAME,API_VERSION}`
/// - `PARLEY_PROVIDERS__{OPENAI,GEMINI}__{API_KEY,API_BASE}`
/// - `PARLEY_BACKEND__{URL,ANON_KEY,ACCESS_TOKEN,USER_ID,MODE}`
///
/// Vendor-conventional keys (`AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`,
/// `AZURE_OPENAI_DEPLOYMENT_NAME`, `OPENAI_API_KEY`, `GEMINI_API_KEY`) only
/// fill fields that are still empty afterwards.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    // AI
    if let Some(val) = lookup("PARLEY_AI__PROVIDER") {
        config.ai.provider = val;
    }
    if let Some(val) = lookup("PARLEY_AI__MODEL") {
        config.ai.model = Some(val).filter(|m| !m.is_empty());
    }
    if let Some(val) = lookup("PARLEY_AI__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.ai.max_tokens = n;
        }
    }
    if let Some(val) = lookup("PARLEY_AI__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.ai.temperature = t;
        }
    }
    if let Some(val) = lookup("PARLEY_AI__SYSTEM_PROMPT") {
        config.ai.system_prompt = val;
    }

    // Azure
    let azure = &mut config.providers.azure;
    if let Some(val) = lookup("PARLEY_PROVIDERS__AZURE__API_KEY") {
        azure.api_key = val;
    }
    if let Some(val) = lookup("PARLEY_PROVIDERS__AZURE__ENDPOINT") {
        azure.endpoint = val;
    }
    if let Some(val) = lookup("PARLEY_PROVIDERS__AZURE__DEPLOYMENT_NAME") {
        azure.deployment_name = val;
    }
    if let Some(val) = lookup("PARLEY_PROVIDERS__AZURE__API_VERSION") {
        azure.api_version = val;
    }
    fill_if_empty(&mut azure.api_key, lookup("AZURE_OPENAI_API_KEY"));
    fill_if_empty(&mut azure.endpoint, lookup("AZURE_OPENAI_ENDPOINT"));
    fill_if_empty(&mut azure.deployment_name, lookup("AZURE_OPENAI_DEPLOYMENT_NAME"));

    apply_provider_env(&mut config.providers.openai, "OPENAI", &lookup);
    apply_provider_env(&mut config.providers.gemini, "GEMINI", &lookup);

    // Backend
    if let Some(val) = lookup("PARLEY_BACKEND__URL") {
        config.backend.url = val;
    }
    if let Some(val) = lookup("PARLEY_BACKEND__ANON_KEY") {
        config.backend.anon_key = val;
    }
    if let Some(val) = lookup("PARLEY_BACKEND__ACCESS_TOKEN") {
        config.backend.access_token = Some(val).filter(|t| !t.is_empty());
    }
    if let Some(val) = lookup("PARLEY_BACKEND__USER_ID") {
        config.backend.user_id = val;
    }
    if let Some(val) = lookup("PARLEY_BACKEND__MODE") {
        match val.parse() {
            Ok(mode) => config.backend.mode = mode,
            Err(e) => warn!("Ignoring PARLEY_BACKEND__MODE: {}", e),
        }
    }

    config
}

/// Apply env var overrides for a single key + base provider.
fn apply_provider_env<F>(provider: &mut ProviderConfig, name: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(&format!("PARLEY_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Some(val) = lookup(&format!("PARLEY_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
    fill_if_empty(&mut provider.api_key, lookup(&format!("{name}_API_KEY")));
}

fn fill_if_empty(field: &mut String, value: Option<String>) {
    if field.trim().is_empty() {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            *field = v;
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
