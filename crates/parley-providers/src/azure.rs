//! Azure OpenAI adapter.
//!
//! Same chat-completions body as OpenAI, but routed by deployment in the URL,
//! authenticated with an `api-key` header and versioned by query string.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use parley_core::types::{
    ChatCompletionRequest, ChatRequest, ChatResponse, ModelInfo, ProviderKind,
};
use parley_core::CancellationToken;

use crate::error::ProviderError;
use crate::http::{build_client, error_from_response};
use crate::openai::{decode_chunk, read_completion, ModelList};
use crate::registry::spec_for;
use crate::stream::{spawn_reader, DeltaStream};
use crate::traits::ChatProvider;

/// Adapter for one Azure OpenAI deployment.
pub struct AzureProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment_name: String,
    api_version: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("endpoint", &self.endpoint)
            .field("deployment_name", &self.deployment_name)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl AzureProvider {
    pub fn new(endpoint: &str, api_key: &str, deployment_name: &str, api_version: &str) -> Self {
        AzureProvider {
            client: build_client(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            deployment_name: deployment_name.to_string(),
            api_version: api_version.to_string(),
            request_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Override the whole-request and per-chunk timeouts.
    pub fn with_timeouts(mut self, request: Duration, stream_idle: Duration) -> Self {
        self.request_timeout = request;
        self.idle_timeout = stream_idle;
        self
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment_name, self.api_version
        )
    }

    fn models_url(&self) -> String {
        format!("{}/openai/models?api-version={}", self.endpoint, self.api_version)
    }

    async fn post(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        // The deployment picks the model; the body carries none.
        let wire = ChatCompletionRequest::from_request(request, false, stream);

        debug!(
            provider = "azure",
            deployment = %self.deployment_name,
            messages = request.messages.len(),
            stream,
            "Calling LLM"
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&wire);
        if !stream {
            builder = builder.timeout(self.request_timeout);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response("azure", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for AzureProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self.post(request, false).await?;
        let resp = read_completion(response, &self.deployment_name).await?;
        debug!(
            provider = "azure",
            finish_reason = resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(resp)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        let response = self.post(request, true).await?;
        Ok(spawn_reader("azure", response, decode_chunk, cancel, self.idle_timeout))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .header("api-key", &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("azure", response).await);
        }
        let list: ModelList = response.json().await?;
        Ok(list.into_models(ProviderKind::Azure))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn display_name(&self) -> &str {
        spec_for(ProviderKind::Azure).display_name
    }

    fn default_model(&self) -> &str {
        &self.deployment_name
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::Message;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest::new("ignored", vec![Message::user("Hello")])
    }

    fn provider(server: &MockServer) -> AzureProvider {
        AzureProvider::new(&server.uri(), "az-key", "gpt-4", "2024-02-15-preview")
    }

    #[test]
    fn test_urls() {
        let provider = AzureProvider::new(
            "https://res.openai.azure.com/",
            "k",
            "gpt-35-turbo",
            "2024-02-15-preview",
        );
        assert_eq!(
            provider.completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-35-turbo/chat/completions?api-version=2024-02-15-preview"
        );
        assert_eq!(
            provider.models_url(),
            "https://res.openai.azure.com/openai/models?api-version=2024-02-15-preview"
        );
    }

    #[tokio::test]
    async fn test_chat_uses_deployment_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4/chat/completions"))
            .and(query_param("api-version", "2024-02-15-preview"))
            .and(header("api-key", "az-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-az",
                "choices": [{"message": {"content": "Hi from Azure"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 5}
            })))
            .mount(&server)
            .await;

        let resp = provider(&server).chat(&request()).await.unwrap();
        assert_eq!(resp.content, "Hi from Azure");
        assert_eq!(resp.model, "gpt-4");

        let received: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.get("model").is_none());
        assert_eq!(body["temperature"], 0.7);
    }

    #[tokio::test]
    async fn test_stream_matches_non_streaming() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" from\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" Azure\"},\"finish_reason\":\"stop\"}]}\n\n\
data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4/chat/completions"))
            .and(wiremock::matchers::body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Hi from Azure"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let azure = provider(&server);
        let full = azure.chat(&request()).await.unwrap().content;
        let streamed = azure
            .chat_stream(&request(), CancellationToken::new())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(streamed, full);
    }

    #[tokio::test]
    async fn test_error_without_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Resource not found"))
            .mount(&server)
            .await;

        let err = provider(&server).chat(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openai/models"))
            .and(header("api-key", "az-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "gpt-4"}, {"id": "gpt-35-turbo"}]
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models().await.unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt-4", "gpt-35-turbo"]);
    }
}
