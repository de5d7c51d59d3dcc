//! OpenAI adapter, plus the chat-completions decoding Azure shares.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use parley_core::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatRequest, ChatResponse,
    ModelInfo, ProviderKind,
};
use parley_core::CancellationToken;

use crate::error::ProviderError;
use crate::http::{build_client, error_from_response};
use crate::registry::spec_for;
use crate::stream::{spawn_reader, ChunkUpdate, DeltaStream};
use crate::traits::ChatProvider;

// ─────────────────────────────────────────────
// Shared chat-completions format
// ─────────────────────────────────────────────

/// Decode one streamed chat-completions frame.
pub(crate) fn decode_chunk(payload: &str) -> Result<ChunkUpdate, serde_json::Error> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
    let usage = chunk.usage;
    let mut update = ChunkUpdate {
        usage,
        ..Default::default()
    };
    if let Some(choice) = chunk.choices.into_iter().next() {
        update.delta = choice.delta.content;
        update.finish_reason = choice.finish_reason;
    }
    Ok(update)
}

/// Read and normalize a non-streaming chat-completions body.
pub(crate) async fn read_completion(
    response: reqwest::Response,
    requested_model: &str,
) -> Result<ChatResponse, ProviderError> {
    let body: ChatCompletionResponse = response.json().await?;
    body.into_chat_response(requested_model)
        .ok_or_else(|| ProviderError::Decode("response contained no choices".into()))
}

/// `GET /models` listing shape (OpenAI and Azure).
#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelEntry {
    pub id: String,
}

impl ModelList {
    pub(crate) fn into_models(self, provider: ProviderKind) -> Vec<ModelInfo> {
        self.data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                name: None,
                provider,
            })
            .collect()
    }
}

// ─────────────────────────────────────────────
// OpenAiProvider
// ─────────────────────────────────────────────

/// Adapter for `api.openai.com` (or any compatible base URL).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    default_model: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: &str, api_base: &str, model: &str) -> Self {
        OpenAiProvider {
            client: build_client(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: model.to_string(),
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
        format!("{}/chat/completions", self.api_base)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.api_base)
    }

    fn model_or_default<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        }
    }

    async fn post(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<(reqwest::Response, String), ProviderError> {
        let model = self.model_or_default(request).to_string();
        let mut wire = ChatCompletionRequest::from_request(request, true, stream);
        wire.model = Some(model.clone());

        debug!(
            provider = "openai",
            model = %model,
            messages = request.messages.len(),
            stream,
            "Calling LLM"
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&wire);
        if !stream {
            builder = builder.timeout(self.request_timeout);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }
        Ok((response, model))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let (response, model) = self.post(request, false).await?;
        let resp = read_completion(response, &model).await?;
        debug!(
            provider = "openai",
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
        let (response, _) = self.post(request, true).await?;
        Ok(spawn_reader(
            "openai",
            response,
            decode_chunk,
            cancel,
            self.idle_timeout,
        ))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }
        let list: ModelList = response.json().await?;
        Ok(list.into_models(ProviderKind::OpenAi))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn display_name(&self) -> &str {
        spec_for(ProviderKind::OpenAi).display_name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{Message, StreamEvent};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"I\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" understand\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\" you\"},\"finish_reason\":\"stop\"}]}\n\n\
data: [DONE]\n\n";

    fn request() -> ChatRequest {
        ChatRequest::new(
            "gpt-4o",
            vec![Message::system("You are Parley."), Message::user("Hello")],
        )
    }

    async fn mount_completion(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(SSE_BODY),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-test",
                "choices": [{
                    "message": {"role": "assistant", "content": "I understand you"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let provider = OpenAiProvider::new("key", "https://api.openai.com/v1/", "gpt-4o");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(provider.models_url(), "https://api.openai.com/v1/models");
    }

    #[test]
    fn test_decode_chunk() {
        let update = decode_chunk(r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#).unwrap();
        assert_eq!(update.delta.as_deref(), Some("Hi"));
        let update = decode_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        )
        .unwrap();
        assert!(update.delta.is_none());
        assert_eq!(update.usage.unwrap().total_tokens, 3);
        assert!(decode_chunk("{oops").is_err());
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 1000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-test",
                "model": "gpt-4o-2024-08-06",
                "choices": [{"message": {"content": "Hello! I'm Parley."}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key-123", &server.uri(), "gpt-4o");
        let resp = provider.chat(&request()).await.unwrap();

        assert_eq!(resp.content, "Hello! I'm Parley.");
        assert_eq!(resp.model, "gpt-4o-2024-08-06");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_stream_matches_non_streaming() {
        let server = MockServer::start().await;
        mount_completion(&server).await;

        let provider = OpenAiProvider::new("key", &server.uri(), "gpt-4o");
        let full = provider.chat(&request()).await.unwrap().content;
        let streamed = provider
            .chat_stream(&request(), CancellationToken::new())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();

        assert_eq!(streamed, full);
    }

    #[tokio::test]
    async fn test_stream_prefixes_in_order() {
        let server = MockServer::start().await;
        mount_completion(&server).await;

        let provider = OpenAiProvider::new("key", &server.uri(), "gpt-4o");
        let mut stream = provider
            .chat_stream(&request(), CancellationToken::new())
            .await
            .unwrap();

        let mut text = String::new();
        let mut states = Vec::new();
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Delta(d) => {
                    text.push_str(&d);
                    states.push(text.clone());
                }
                StreamEvent::Done { finish_reason, .. } => {
                    assert_eq!(finish_reason.as_deref(), Some("stop"));
                    break;
                }
                StreamEvent::Error(e) => panic!("{e}"),
            }
        }
        assert_eq!(states, vec!["I", "I understand", "I understand you"]);
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", &server.uri(), "gpt-4o");
        let err = provider.chat(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.to_string(), "Rate limit exceeded");

        let err = provider
            .chat_stream(&request(), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_chat_network_error() {
        let provider = OpenAiProvider::new("key", "http://127.0.0.1:1", "gpt-4o");
        let err = provider.chat(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_no_choices_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x", "choices": []})))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", &server.uri(), "gpt-4o");
        assert!(matches!(
            provider.chat(&request()).await.unwrap_err(),
            ProviderError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("Authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "gpt-4o", "object": "model"}, {"id": "gpt-4o-mini", "object": "model"}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", &server.uri(), "gpt-4o");
        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "gpt-4o");
        assert_eq!(models[0].provider, ProviderKind::OpenAi);
        assert!(provider.health_check().await);
    }
}
