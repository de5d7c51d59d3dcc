//! Chat provider trait: the one interface every vendor adapter implements.

use async_trait::async_trait;

use parley_core::types::{ChatRequest, ChatResponse, ModelInfo, ProviderKind};
use parley_core::CancellationToken;

use crate::error::ProviderError;
use crate::stream::DeltaStream;

/// A chat-completion backend (Azure OpenAI, OpenAI, Gemini or the mock).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a request and wait for the complete response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a request with streaming enabled.
    ///
    /// HTTP-level failures are returned here, before any delta. Failures
    /// after the stream starts arrive as a terminal `StreamEvent::Error`.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError>;

    /// Models the provider currently offers.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Whether the provider answers an authenticated request.
    async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }

    /// The provider this instance talks to (or stands in for, when mocked).
    fn kind(&self) -> ProviderKind;

    /// Display name for logging.
    fn display_name(&self) -> &str;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Whether responses are canned rather than generated.
    fn is_mock(&self) -> bool {
        false
    }
}
