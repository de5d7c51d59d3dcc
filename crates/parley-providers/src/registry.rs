//! Provider registry: static specs for the supported LLM vendors and their
//! model catalogs.
//!
//! Each `ProviderSpec` describes how to reach a vendor: display name,
//! vendor-conventional env vars, default API base and known models.

use parley_core::types::ProviderKind;

// ─────────────────────────────────────────────
// Specs
// ─────────────────────────────────────────────

/// A model listed in a provider's static catalog.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    /// Wire id (for Azure, also the conventional deployment name).
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Context window in tokens.
    pub context_window: u32,
}

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Internal name (e.g. `"openai"`).
    pub name: &'static str,
    /// Human-readable name for logs and status. E.g. `"Google Gemini"`.
    pub display_name: &'static str,
    pub description: &'static str,
    /// Vendor-conventional environment variables the loader consults.
    pub env_keys: &'static [&'static str],
    /// Default API base. `None` for Azure, whose endpoint is per-resource.
    pub default_api_base: Option<&'static str>,
    pub default_model: &'static str,
    pub models: &'static [ModelSpec],
}

impl ProviderSpec {
    pub fn find_model(&self, id: &str) -> Option<&'static ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }
}

/// All supported providers, in display order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        kind: ProviderKind::Azure,
        name: "azure",
        display_name: "Azure OpenAI",
        description: "Enterprise-grade OpenAI models hosted on Azure",
        env_keys: &[
            "AZURE_OPENAI_API_KEY",
            "AZURE_OPENAI_ENDPOINT",
            "AZURE_OPENAI_DEPLOYMENT_NAME",
        ],
        default_api_base: None,
        default_model: "gpt-4",
        models: &[
            ModelSpec {
                id: "gpt-4",
                name: "GPT-4",
                description: "Most capable model, great for complex tasks",
                context_window: 8192,
            },
            ModelSpec {
                id: "gpt-4-32k",
                name: "GPT-4 32K",
                description: "GPT-4 with extended context length",
                context_window: 32768,
            },
            ModelSpec {
                id: "gpt-35-turbo",
                name: "GPT-3.5 Turbo",
                description: "Fast and efficient for most tasks",
                context_window: 4096,
            },
            ModelSpec {
                id: "gpt-35-turbo-16k",
                name: "GPT-3.5 Turbo 16K",
                description: "GPT-3.5 with extended context length",
                context_window: 16384,
            },
        ],
    },
    ProviderSpec {
        kind: ProviderKind::OpenAi,
        name: "openai",
        display_name: "OpenAI",
        description: "GPT models served directly by OpenAI",
        env_keys: &["OPENAI_API_KEY"],
        default_api_base: Some("https://api.openai.com/v1"),
        default_model: "gpt-4o-mini",
        models: &[
            ModelSpec {
                id: "gpt-4o",
                name: "GPT-4o",
                description: "Most advanced model with multimodal capabilities",
                context_window: 128000,
            },
            ModelSpec {
                id: "gpt-4o-mini",
                name: "GPT-4o Mini",
                description: "Faster and more affordable GPT-4o",
                context_window: 128000,
            },
            ModelSpec {
                id: "gpt-4-turbo",
                name: "GPT-4 Turbo",
                description: "Latest GPT-4 model with improved performance",
                context_window: 128000,
            },
            ModelSpec {
                id: "gpt-3.5-turbo",
                name: "GPT-3.5 Turbo",
                description: "Fast and efficient for most tasks",
                context_window: 16385,
            },
        ],
    },
    ProviderSpec {
        kind: ProviderKind::Gemini,
        name: "gemini",
        display_name: "Google Gemini",
        description: "Google's Gemini family via the Generative Language API",
        env_keys: &["GEMINI_API_KEY"],
        default_api_base: Some("https://generativelanguage.googleapis.com/v1beta"),
        default_model: "gemini-1.5-flash",
        models: &[
            ModelSpec {
                id: "gemini-1.5-pro",
                name: "Gemini 1.5 Pro",
                description: "Most capable Gemini model with long context",
                context_window: 2097152,
            },
            ModelSpec {
                id: "gemini-1.5-flash",
                name: "Gemini 1.5 Flash",
                description: "Fast and efficient Gemini model",
                context_window: 1048576,
            },
            ModelSpec {
                id: "gemini-1.0-pro",
                name: "Gemini 1.0 Pro",
                description: "Balanced performance and efficiency",
                context_window: 32768,
            },
        ],
    },
];

// ─────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────

/// Find a provider spec by internal name (case-insensitive).
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    let name = name.trim().to_lowercase();
    PROVIDERS.iter().find(|s| s.name == name)
}

/// The registry entry for a provider kind. Every kind has one.
pub fn spec_for(kind: ProviderKind) -> &'static ProviderSpec {
    PROVIDERS
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&PROVIDERS[0])
}

/// Which provider's catalog lists `model`, if any.
///
/// Used to switch providers automatically when the user picks a model.
pub fn find_provider_for_model(model: &str) -> Option<ProviderKind> {
    PROVIDERS
        .iter()
        .find(|s| s.models.iter().any(|m| m.id == model))
        .map(|s| s.kind)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
