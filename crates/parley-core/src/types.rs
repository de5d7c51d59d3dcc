//! Core types for Parley: the provider-neutral chat shapes every adapter
//! translates to and from, plus the persisted chat/subscription records.
//!
//! The OpenAI-compatible wire structs live here too because both the Azure
//! and OpenAI adapters speak that format verbatim.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::truncate_with_ellipsis;

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// The LLM vendors Parley can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// All providers in display order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Azure,
        ProviderKind::OpenAi,
        ProviderKind::Gemini,
    ];

    /// Config/CLI name (e.g. `"openai"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azure",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Azure
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a provider name is not one of `azure`, `openai`, `gemini`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider '{0}' (expected azure, openai or gemini)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" | "azure-openai" => Ok(ProviderKind::Azure),
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────
// Messages (OpenAI chat completions format)
// ─────────────────────────────────────────────

/// Speaker of a message sent to a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message in the generic request shape.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Generic request / response
// ─────────────────────────────────────────────

/// Default completion budget, matching what the web client always sent.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// A provider-neutral chat completion request.
///
/// Streaming is chosen by calling `chat_stream` instead of `chat`, so there
/// is no stream flag here.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    /// Model id (OpenAI/Gemini). Azure routes by deployment and ignores it.
    pub model: String,
    /// Conversation in send order.
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        ChatRequest {
            model: model.into(),
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// The text of the most recent user message, or `""`.
    pub fn last_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Token usage statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) response, normalized across providers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponse {
    pub id: Option<String>,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

/// One event on a streaming response.
///
/// A stream carries any number of `Delta`s followed by exactly one terminal
/// `Done` or `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental text, in arrival order.
    Delta(String),
    /// The provider signalled completion (sentinel or end of body).
    Done {
        finish_reason: Option<String>,
        usage: Option<UsageInfo>,
    },
    /// The stream failed after it started.
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }
}

/// A model advertised by a provider's list-models endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub provider: ProviderKind,
}

// ─────────────────────────────────────────────
// OpenAI-compatible wire format (OpenAI + Azure)
// ─────────────────────────────────────────────

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// Omitted for Azure, which routes by deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Build the wire body from a generic request.
    pub fn from_request(request: &ChatRequest, include_model: bool, stream: bool) -> Self {
        ChatCompletionRequest {
            model: include_model.then(|| request.model.clone()),
            messages: request.messages.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stream,
        }
    }
}

/// Raw chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Normalize, falling back to `requested_model` when the body omits it.
    ///
    /// Returns `None` when there are no choices.
    pub fn into_chat_response(self, requested_model: &str) -> Option<ChatResponse> {
        let choice = self.choices.into_iter().next()?;
        Some(ChatResponse {
            id: self.id,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: self.usage,
        })
    }
}

/// One `data:` frame of a streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

// ─────────────────────────────────────────────
// Persisted chats
// ─────────────────────────────────────────────

/// Title given to chats created before their first message.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";
/// Characters of the first user message kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 50;
/// Characters of the first user message kept in a derived preview.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Who wrote a stored message. System prompts are never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl From<Author> for Role {
    fn from(author: Author) -> Self {
        match author {
            Author::User => Role::User,
            Author::Assistant => Role::Assistant,
        }
    }
}

/// A message persisted in a chat. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Convert into the provider request shape.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role.into(),
            content: self.content.clone(),
        }
    }
}

/// A titled conversation thread.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Empty when loaded through a listing.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl Chat {
    /// Whether the title is still the placeholder and may be derived.
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CHAT_TITLE
    }
}

/// Title derived from a chat's first user message.
pub fn derive_title(first_message: &str) -> String {
    truncate_with_ellipsis(first_message.trim(), TITLE_MAX_CHARS)
}

/// Preview derived from a chat's first user message.
pub fn derive_preview(first_message: &str) -> String {
    truncate_with_ellipsis(first_message.trim(), PREVIEW_MAX_CHARS)
}

/// Partial update of a chat row.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ChatUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl ChatUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.preview.is_none()
    }
}

// ─────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────

/// Usage tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Plus,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Plus => "plus",
        }
    }
}

/// Default number of chats a free user may create.
pub const DEFAULT_FREE_CHAT_LIMIT: u32 = 5;

/// A user's plan and chat quota.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub plan: Plan,
    pub chat_limit: u32,
    pub current_count: u32,
}

impl Subscription {
    /// A fresh free-tier subscription.
    pub fn free(chat_limit: u32) -> Self {
        Subscription {
            plan: Plan::Free,
            chat_limit,
            current_count: 0,
        }
    }

    /// Whether another chat may be created. Plus is unlimited.
    pub fn can_create_chat(&self) -> bool {
        match self.plan {
            Plan::Plus => true,
            Plan::Free => self.current_count < self.chat_limit,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let msg = Message::system("Be helpful.");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"role": "system", "content": "Be helpful."}));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Azure".parse::<ProviderKind>().unwrap(), ProviderKind::Azure);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" gemini ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        let err = "anthropic".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn test_provider_kind_serde_names() {
        assert_eq!(serde_json::to_value(ProviderKind::OpenAi).unwrap(), "openai");
        let kind: ProviderKind = serde_json::from_value(json!("gemini")).unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
    }

    #[test]
    fn test_last_user_message() {
        let req = ChatRequest::new(
            "gpt-4o",
            vec![
                Message::system("sys"),
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
            ],
        );
        assert_eq!(req.last_user_message(), "second");
        assert_eq!(ChatRequest::new("m", vec![]).last_user_message(), "");
    }

    #[test]
    fn test_completion_request_azure_omits_model_and_stream() {
        let req = ChatRequest::new("gpt-4", vec![Message::user("hi")]);
        let body =
            serde_json::to_value(ChatCompletionRequest::from_request(&req, false, false)).unwrap();
        assert!(body.get("model").is_none());
        assert!(body.get("stream").is_none());
        assert!(body.get("top_p").is_none());
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn test_completion_request_openai_streaming() {
        let req = ChatRequest::new("gpt-4o", vec![Message::user("hi")]).with_top_p(0.9);
        let body =
            serde_json::to_value(ChatCompletionRequest::from_request(&req, true, true)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["top_p"], 0.9);
    }

    #[test]
    fn test_completion_response_normalization() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }))
        .unwrap();
        let normalized = resp.into_chat_response("gpt-4o").unwrap();
        assert_eq!(normalized.content, "Hello");
        assert_eq!(normalized.model, "gpt-4o");
        assert_eq!(normalized.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_completion_response_no_choices() {
        let resp: ChatCompletionResponse =
            serde_json::from_value(json!({"id": null, "choices": [], "usage": null})).unwrap();
        assert!(resp.into_chat_response("gpt-4o").is_none());
    }

    #[test]
    fn test_chunk_parsing_tolerates_missing_fields() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{}}]}"#).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
        let empty: ChatCompletionChunk = serde_json::from_str("{}").unwrap();
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn test_derive_title_and_preview() {
        let long = "a".repeat(120);
        assert_eq!(derive_title(&long), format!("{}...", "a".repeat(50)));
        assert_eq!(derive_preview(&long), format!("{}...", "a".repeat(100)));
        assert_eq!(derive_title("  short question  "), "short question");
    }

    #[test]
    fn test_subscription_quota() {
        let sub = Subscription {
            plan: Plan::Free,
            chat_limit: 5,
            current_count: 5,
        };
        assert!(!sub.can_create_chat());

        let sub = Subscription { current_count: 4, ..sub };
        assert!(sub.can_create_chat());

        let plus = Subscription {
            plan: Plan::Plus,
            chat_limit: 5,
            current_count: 50,
        };
        assert!(plus.can_create_chat());
    }

    #[test]
    fn test_stored_message_to_message() {
        let stored = StoredMessage {
            id: "m1".into(),
            chat_id: "c1".into(),
            role: Author::Assistant,
            content: "hi".into(),
            created_at: Utc::now(),
        };
        assert_eq!(stored.to_message(), Message::assistant("hi"));
    }

    #[test]
    fn test_stream_event_terminal() {
        assert!(!StreamEvent::Delta("x".into()).is_terminal());
        assert!(StreamEvent::Error("boom".into()).is_terminal());
        assert!(StreamEvent::Done { finish_reason: None, usage: None }.is_terminal());
    }
}
