//! `Assistant`: a provider plus the generation settings it is called with.

use tracing::info;

use parley_core::types::{ChatRequest, ChatResponse, ProviderKind, StoredMessage};
use parley_core::{CancellationToken, Config};
use parley_providers::{
    create_provider_for, find_provider_for_model, ChatProvider, DeltaStream, ProviderError,
};

use crate::context::ContextBuilder;

/// What the front end shows about the active provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantStatus {
    pub provider: ProviderKind,
    pub display_name: String,
    pub model: String,
    pub mock: bool,
}

/// Sends conversations to the configured provider (or the mock).
pub struct Assistant {
    provider: Box<dyn ChatProvider>,
    context: ContextBuilder,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("provider", &self.provider.display_name())
            .field("model", &self.model)
            .field("mock", &self.provider.is_mock())
            .finish()
    }
}

impl Assistant {
    /// Wrap an already-built provider with the config's generation settings.
    pub fn new(provider: Box<dyn ChatProvider>, config: &Config) -> Self {
        let model = provider.default_model().to_string();
        Assistant {
            provider,
            context: ContextBuilder::new(config.ai.system_prompt.clone()),
            model,
            max_tokens: config.ai.max_tokens,
            temperature: config.ai.temperature,
        }
    }

    /// Build the provider selected in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(parley_providers::create_provider(config), config)
    }

    /// Switch to `model`, changing provider when another one's catalog
    /// lists it.
    pub fn set_model(&mut self, config: &Config, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            return;
        }
        let kind = find_provider_for_model(model).unwrap_or_else(|| self.provider.kind());
        if kind != self.provider.kind() {
            info!(from = %self.provider.kind(), to = %kind, model, "Switching provider for model");
            self.provider = create_provider_for(config, kind);
        }
        self.model = model.to_string();
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            provider: self.provider.kind(),
            display_name: self.provider.display_name().to_string(),
            model: self.model.clone(),
            mock: self.provider.is_mock(),
        }
    }

    pub fn provider(&self) -> &dyn ChatProvider {
        self.provider.as_ref()
    }

    pub fn is_mock(&self) -> bool {
        self.provider.is_mock()
    }

    /// The request that would be sent for `user_text` after `history`.
    pub fn build_request(&self, history: &[StoredMessage], user_text: &str) -> ChatRequest {
        ChatRequest::new(self.model.clone(), self.context.build_messages(history, user_text))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }

    /// Generate a complete reply.
    pub async fn reply(
        &self,
        history: &[StoredMessage],
        user_text: &str,
    ) -> Result<ChatResponse, ProviderError> {
        self.provider.chat(&self.build_request(history, user_text)).await
    }

    /// Generate a reply as a stream of deltas.
    pub async fn reply_stream(
        &self,
        history: &[StoredMessage],
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        self.provider
            .chat_stream(&self.build_request(history, user_text), cancel)
            .await
    }

    /// Live connectivity check against the provider.
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }
}
