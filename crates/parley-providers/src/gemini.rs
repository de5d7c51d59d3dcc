//! Google Gemini adapter (Generative Language API).
//!
//! Gemini has its own wire format: system messages travel separately as
//! `systemInstruction`, the assistant role is called `model`, and sampling
//! settings live under `generationConfig`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use parley_core::types::{
    ChatRequest, ChatResponse, Message, ModelInfo, ProviderKind, Role, UsageInfo,
};
use parley_core::CancellationToken;

use crate::error::ProviderError;
use crate::http::{build_client, error_from_response};
use crate::registry::spec_for;
use crate::stream::{spawn_reader, ChunkUpdate, DeltaStream};
use crate::traits::ChatProvider;

// ─────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn from_request(request: &ChatRequest) -> Self {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system.join("\n\n"),
            }],
        });

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(to_content)
            .collect();

        GenerateRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
            },
        }
    }
}

fn to_content(message: &Message) -> Content {
    let role = match message.role {
        Role::Assistant => "model",
        _ => "user",
    };
    Content {
        role: Some(role.to_string()),
        parts: vec![Part {
            text: message.content.clone(),
        }],
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<UsageMetadata> for UsageInfo {
    fn from(u: UsageMetadata) -> Self {
        UsageInfo {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }
    }
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(content.parts.iter().map(|p| p.text.as_str()).collect())
    }

    fn finish_reason(&self) -> Option<String> {
        self.candidates.first().and_then(|c| c.finish_reason.clone())
    }
}

fn decode_chunk(payload: &str) -> Result<ChunkUpdate, serde_json::Error> {
    let chunk: GenerateResponse = serde_json::from_str(payload)?;
    Ok(ChunkUpdate {
        delta: chunk.text(),
        finish_reason: chunk.finish_reason(),
        usage: chunk.usage_metadata.map(UsageInfo::from),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

// ─────────────────────────────────────────────
// GeminiProvider
// ─────────────────────────────────────────────

/// Adapter for the Gemini `generateContent` endpoints.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    default_model: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: &str, api_base: &str, model: &str) -> Self {
        GeminiProvider {
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

    fn model<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        model.strip_prefix("models/").unwrap_or(model)
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/models/{}:streamGenerateContent?alt=sse", self.api_base, model)
    }

    async fn post(
        &self,
        url: String,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = GenerateRequest::from_request(request);
        debug!(
            provider = "gemini",
            model = %self.model(request),
            messages = body.contents.len(),
            stream,
            "Calling LLM"
        );

        let mut builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        if !stream {
            builder = builder.timeout(self.request_timeout);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response("gemini", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = self.model(request).to_string();
        let response = self.post(self.generate_url(&model), request, false).await?;
        let body: GenerateResponse = response.json().await?;

        let content = body
            .text()
            .ok_or_else(|| ProviderError::Decode("response contained no candidates".into()))?;
        Ok(ChatResponse {
            id: None,
            finish_reason: body.finish_reason(),
            model: body.model_version.clone().unwrap_or(model),
            content,
            usage: body.usage_metadata.map(UsageInfo::from),
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        let url = self.stream_url(self.model(request));
        let response = self.post(url, request, true).await?;
        Ok(spawn_reader("gemini", response, decode_chunk, cancel, self.idle_timeout))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("gemini", response).await);
        }
        let list: ModelList = response.json().await?;
        Ok(list
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.strip_prefix("models/").unwrap_or(&m.name).to_string(),
                name: m.display_name,
                provider: ProviderKind::Gemini,
            })
            .collect())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn display_name(&self) -> &str {
        spec_for(ProviderKind::Gemini).display_name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
