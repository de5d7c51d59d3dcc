//! Provider factory: builds the adapter for the resolved configuration.

use std::time::Duration;

use tracing::{debug, info};

use parley_core::types::ProviderKind;
use parley_core::Config;

use crate::azure::AzureProvider;
use crate::gemini::GeminiProvider;
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;
use crate::resolver::{model_for, resolve_for, ProviderSettings, ResolvedProvider};
use crate::traits::ChatProvider;

/// Build the provider selected by `ai.provider`, or a mock when its
/// credentials are incomplete.
pub fn create_provider(config: &Config) -> Box<dyn ChatProvider> {
    create_provider_for(config, config.provider_kind())
}

/// Build a specific provider regardless of the selected one.
pub fn create_provider_for(config: &Config, kind: ProviderKind) -> Box<dyn ChatProvider> {
    let request_timeout = Duration::from_secs(config.ai.request_timeout_secs.max(1));
    let idle_timeout = Duration::from_secs(config.ai.stream_idle_timeout_secs.max(1));
    let model = model_for(config, kind);

    match resolve_for(config, kind) {
        ResolvedProvider::Unconfigured { provider, missing } => {
            info!(
                provider = %provider,
                missing = %missing.join(", "),
                "Provider not configured, using mock responses"
            );
            Box::new(MockProvider::new(provider, &config.mock))
        }
        ResolvedProvider::Configured(settings) => {
            debug!(provider = %settings.kind(), model = %model, "Creating LLM provider");
            match settings {
                ProviderSettings::Azure {
                    endpoint,
                    api_key,
                    deployment_name,
                    api_version,
                } => Box::new(
                    AzureProvider::new(&endpoint, &api_key, &deployment_name, &api_version)
                        .with_timeouts(request_timeout, idle_timeout),
                ),
                ProviderSettings::OpenAi { api_key, api_base } => Box::new(
                    OpenAiProvider::new(&api_key, &api_base, &model)
                        .with_timeouts(request_timeout, idle_timeout),
                ),
                ProviderSettings::Gemini { api_key, api_base } => Box::new(
                    GeminiProvider::new(&api_key, &api_base, &model)
                        .with_timeouts(request_timeout, idle_timeout),
                ),
            }
        }
    }
}
