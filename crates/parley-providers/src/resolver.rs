//! Provider config resolver: turns the loaded `Config` into connection
//! settings for one provider, or reports what is missing.
//!
//! No network calls happen here. An incomplete configuration is not an error:
//! it selects mock mode.

use parley_core::config::schema::DEFAULT_AZURE_API_VERSION;
use parley_core::types::ProviderKind;
use parley_core::Config;

use crate::registry::{find_provider_for_model, spec_for};

/// Everything an adapter needs to reach its provider.
#[derive(Clone, PartialEq)]
pub enum ProviderSettings {
    Azure {
        endpoint: String,
        api_key: String,
        deployment_name: String,
        api_version: String,
    },
    OpenAi {
        api_key: String,
        api_base: String,
    },
    Gemini {
        api_key: String,
        api_base: String,
    },
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderSettings::Azure { .. } => ProviderKind::Azure,
            ProviderSettings::OpenAi { .. } => ProviderKind::OpenAi,
            ProviderSettings::Gemini { .. } => ProviderKind::Gemini,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys stay out of logs.
        match self {
            ProviderSettings::Azure {
                endpoint,
                deployment_name,
                api_version,
                ..
            } => f
                .debug_struct("Azure")
                .field("endpoint", endpoint)
                .field("deployment_name", deployment_name)
                .field("api_version", api_version)
                .finish_non_exhaustive(),
            ProviderSettings::OpenAi { api_base, .. } => f
                .debug_struct("OpenAi")
                .field("api_base", api_base)
                .finish_non_exhaustive(),
            ProviderSettings::Gemini { api_base, .. } => f
                .debug_struct("Gemini")
                .field("api_base", api_base)
                .finish_non_exhaustive(),
        }
    }
}

/// Outcome of resolving one provider.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedProvider {
    Configured(ProviderSettings),
    /// Required fields are blank; the caller should run in mock mode.
    Unconfigured {
        provider: ProviderKind,
        missing: Vec<&'static str>,
    },
}

impl ResolvedProvider {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ResolvedProvider::Configured(settings) => settings.kind(),
            ResolvedProvider::Unconfigured { provider, .. } => *provider,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, ResolvedProvider::Configured(_))
    }
}

/// Resolve the provider selected by `ai.provider`.
pub fn resolve(config: &Config) -> ResolvedProvider {
    resolve_for(config, config.provider_kind())
}

/// Resolve a specific provider regardless of which one is selected.
pub fn resolve_for(config: &Config, kind: ProviderKind) -> ResolvedProvider {
    let providers = &config.providers;
    match kind {
        ProviderKind::Azure => {
            let azure = &providers.azure;
            let missing = azure.missing_fields();
            if !missing.is_empty() {
                return ResolvedProvider::Unconfigured {
                    provider: kind,
                    missing,
                };
            }
            let api_version = if azure.api_version.trim().is_empty() {
                DEFAULT_AZURE_API_VERSION.to_string()
            } else {
                azure.api_version.trim().to_string()
            };
            ResolvedProvider::Configured(ProviderSettings::Azure {
                endpoint: azure.endpoint.trim().trim_end_matches('/').to_string(),
                api_key: azure.api_key.trim().to_string(),
                deployment_name: azure.deployment_name.trim().to_string(),
                api_version,
            })
        }
        ProviderKind::OpenAi | ProviderKind::Gemini => {
            let cfg = if kind == ProviderKind::OpenAi {
                &providers.openai
            } else {
                &providers.gemini
            };
            if !cfg.is_configured() {
                return ResolvedProvider::Unconfigured {
                    provider: kind,
                    missing: vec!["apiKey"],
                };
            }
            let api_base = cfg
                .api_base
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .or(spec_for(kind).default_api_base)
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string();
            let api_key = cfg.api_key.trim().to_string();
            ResolvedProvider::Configured(if kind == ProviderKind::OpenAi {
                ProviderSettings::OpenAi { api_key, api_base }
            } else {
                ProviderSettings::Gemini { api_key, api_base }
            })
        }
    }
}

/// The model to use with `kind`: the configured one when it belongs to that
/// provider (or is not in any catalog), else the provider's default.
pub fn model_for(config: &Config, kind: ProviderKind) -> String {
    match config.ai.model.as_deref().map(str::trim) {
        Some(model)
            if !model.is_empty()
                && find_provider_for_model(model).map_or(true, |owner| owner == kind) =>
        {
            model.to_string()
        }
        _ => spec_for(kind).default_model.to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn azure_config() -> Config {
        let mut config = Config::default();
        config.providers.azure.endpoint = "https://res.openai.azure.com/".into();
        config.providers.azure.api_key = "az-key".into();
        config.providers.azure.deployment_name = "gpt-4".into();
        config
    }

    #[test]
    fn test_default_config_is_unconfigured_azure() {
        let resolved = resolve(&Config::default());
        assert_eq!(
            resolved,
            ResolvedProvider::Unconfigured {
                provider: ProviderKind::Azure,
                missing: vec!["endpoint", "apiKey", "deploymentName"],
            }
        );
        assert!(!resolved.is_configured());
    }

    #[test]
    fn test_azure_configured_trims_endpoint() {
        match resolve(&azure_config()) {
            ResolvedProvider::Configured(ProviderSettings::Azure {
                endpoint,
                api_version,
                ..
            }) => {
                assert_eq!(endpoint, "https://res.openai.azure.com");
                assert_eq!(api_version, "2024-02-15-preview");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_blank_api_version_defaults() {
        let mut config = azure_config();
        config.providers.azure.api_version = "  ".into();
        let ResolvedProvider::Configured(ProviderSettings::Azure { api_version, .. }) =
            resolve(&config)
        else {
            panic!("expected azure");
        };
        assert_eq!(api_version, DEFAULT_AZURE_API_VERSION);
    }

    #[test]
    fn test_openai_default_base() {
        let mut config = Config::default();
        config.ai.provider = "openai".into();
        config.providers.openai.api_key = "sk-test".into();
        assert_eq!(
            resolve(&config),
            ResolvedProvider::Configured(ProviderSettings::OpenAi {
                api_key: "sk-test".into(),
                api_base: "https://api.openai.com/v1".into(),
            })
        );
    }

    #[test]
    fn test_gemini_custom_base_and_missing_key() {
        let mut config = Config::default();
        config.providers.gemini.api_base = Some("http://localhost:9000/".into());
        assert_eq!(
            resolve_for(&config, ProviderKind::Gemini),
            ResolvedProvider::Unconfigured {
                provider: ProviderKind::Gemini,
                missing: vec!["apiKey"],
            }
        );
        config.providers.gemini.api_key = "g".into();
        match resolve_for(&config, ProviderKind::Gemini) {
            ResolvedProvider::Configured(ProviderSettings::Gemini { api_base, .. }) => {
                assert_eq!(api_base, "http://localhost:9000")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_provider_resolves_azure() {
        let mut config = azure_config();
        config.ai.provider = "bedrock".into();
        assert_eq!(resolve(&config).provider(), ProviderKind::Azure);
    }

    #[test]
    fn test_model_for() {
        let mut config = Config::default();
        assert_eq!(model_for(&config, ProviderKind::OpenAi), "gpt-4o-mini");

        config.ai.model = Some("gpt-4o".into());
        assert_eq!(model_for(&config, ProviderKind::OpenAi), "gpt-4o");
        assert_eq!(model_for(&config, ProviderKind::Gemini), "gemini-1.5-flash");

        config.ai.model = Some("ft:gpt-4o:custom".into());
        assert_eq!(model_for(&config, ProviderKind::OpenAi), "ft:gpt-4o:custom");
    }

    #[test]
    fn test_debug_hides_keys() {
        let ResolvedProvider::Configured(settings) = resolve(&azure_config()) else {
            panic!("expected configured");
        };
        assert!(!format!("{settings:?}").contains("az-key"));
    }
}
