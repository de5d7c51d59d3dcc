//! Mock responder: canned, keyword-selected answers used when no provider
//! is configured.
//!
//! The same prompt always yields the same text. Streaming replays it word by
//! word with randomized pauses so the front end behaves as it would against a
//! real model.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use parley_core::config::MockConfig;
use parley_core::types::{
    ChatRequest, ChatResponse, ModelInfo, ProviderKind, StreamEvent, UsageInfo,
};
use parley_core::CancellationToken;

use crate::error::ProviderError;
use crate::registry::spec_for;
use crate::stream::DeltaStream;
use crate::traits::ChatProvider;

const FOLLOW_UP_PHRASES: &[&str] = &[
    "what about",
    "how about",
    "what if",
    "can you",
    "tell me more",
    "more details",
    "explain",
    "elaborate",
    "continue",
    "however",
    "also",
    "and",
    "but",
];

const PROGRAMMING_KEYWORDS: &[&str] = &["code", "rust", "javascript", "react", "programming"];
const AI_KEYWORDS: &[&str] = &["ai", "machine learning", "model", "llm"];

/// Topic picked from the latest user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Programming,
    Ai,
    FollowUp,
    General,
}

/// Whether `text` contains `needle` as whole words.
fn contains_words(text: &str, needle: &str) -> bool {
    let is_boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
    text.match_indices(needle).any(|(idx, _)| {
        is_boundary(text[..idx].chars().next_back())
            && is_boundary(text[idx + needle.len()..].chars().next())
    })
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| contains_words(text, k))
}

fn classify(message: &str) -> (Topic, bool) {
    let lower = message.to_lowercase();
    let follow_up = mentions_any(&lower, FOLLOW_UP_PHRASES);
    let topic = if mentions_any(&lower, PROGRAMMING_KEYWORDS) {
        Topic::Programming
    } else if mentions_any(&lower, AI_KEYWORDS) {
        Topic::Ai
    } else if follow_up {
        Topic::FollowUp
    } else {
        Topic::General
    };
    (topic, follow_up)
}

/// The canned answer for `message`.
pub fn mock_reply(message: &str) -> String {
    let message = message.trim();
    let (topic, follow_up) = classify(message);
    match topic {
        Topic::Programming => {
            let subject = if contains_words(&message.to_lowercase(), "rust") {
                "Rust"
            } else {
                "programming"
            };
            let intro = if follow_up {
                format!("Picking up where we left off, here is more on {subject}:")
            } else {
                format!("Good question about {subject}!")
            };
            format!(
                "{intro}\n\n\
## Key points\n\
- Small, focused functions are easier to test and review\n\
- Let the type system carry invariants instead of comments\n\
- Handle errors explicitly at the boundary where they can be acted on\n\n\
## Example\n\
```rust\n\
fn parse_port(input: &str) -> Result<u16, std::num::ParseIntError> {{\n    input.trim().parse()\n}}\n\
```\n\n\
Want me to go deeper into any of these?"
            )
        }
        Topic::Ai => {
            let intro = if follow_up {
                format!("Continuing our AI discussion, you asked about **{message}**.")
            } else {
                "Great question about AI and machine learning!".to_string()
            };
            format!(
                "{intro}\n\n\
## How language models work\n\
1. **Training**: the model learns patterns from large text corpora\n\
2. **Inference**: it predicts the next token given the conversation so far\n\
3. **Fine-tuning**: it can be adapted to narrower tasks\n\
4. **Prompting**: the instructions you give shape the output\n\n\
Which part would you like to explore?"
            )
        }
        Topic::FollowUp => format!(
            "## Following up\n\n\
You're building on our earlier discussion with **{message}**.\n\n\
- The earlier context still applies\n\
- This question narrows it to a concrete case\n\n\
Should I connect it back to the earlier points, or dig into this one?"
        ),
        Topic::General => format!(
            "## Response to: \"{message}\"\n\n\
I understand you're asking about **{message}**. A good way to approach it:\n\n\
1. **Research**: gather information from reliable sources\n\
2. **Plan**: break the problem into steps\n\
3. **Implement**: start with the smallest working version\n\
4. **Iterate**: refine based on feedback\n\n\
Would you like me to dive deeper into any step?"
        ),
    }
}

/// Split text into stream chunks: first word bare, later words with a
/// leading space. Concatenating the chunks restores the text exactly.
pub fn word_chunks(text: &str) -> Vec<String> {
    text.split(' ')
        .enumerate()
        .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {word}") })
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn estimate_usage(request: &ChatRequest, reply: &str) -> UsageInfo {
    let prompt_tokens: usize = request
        .messages
        .iter()
        .map(|m| m.content.split_whitespace().count())
        .sum();
    let completion_tokens = reply.split_whitespace().count();
    UsageInfo {
        prompt_tokens: prompt_tokens as u32,
        completion_tokens: completion_tokens as u32,
        total_tokens: (prompt_tokens + completion_tokens) as u32,
    }
}

// ─────────────────────────────────────────────
// MockProvider
// ─────────────────────────────────────────────

/// Stand-in provider for mock mode.
#[derive(Debug, Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    default_model: String,
    min_delay: Duration,
    max_delay: Duration,
}

impl MockProvider {
    /// A mock standing in for `kind`.
    pub fn new(kind: ProviderKind, config: &MockConfig) -> Self {
        let min = config.min_delay_ms.min(config.max_delay_ms);
        MockProvider {
            kind,
            default_model: spec_for(kind).default_model.to_string(),
            min_delay: Duration::from_millis(min),
            max_delay: Duration::from_millis(config.max_delay_ms.max(min)),
        }
    }

    /// No pauses between words.
    pub fn instant(kind: ProviderKind) -> Self {
        Self::new(
            kind,
            &MockConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
            },
        )
    }

    fn next_delay(&self) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let content = mock_reply(request.last_user_message());
        debug!(provider = "mock", chars = content.len(), "Mock response");
        Ok(ChatResponse {
            id: Some("mock-response".to_string()),
            model: if request.model.is_empty() {
                self.default_model.clone()
            } else {
                request.model.clone()
            },
            usage: Some(estimate_usage(request, &content)),
            content,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        let reply = mock_reply(request.last_user_message());
        let usage = estimate_usage(request, &reply);
        let chunks = word_chunks(&reply);
        let delays: Vec<Duration> = chunks.iter().map(|_| self.next_delay()).collect();
        let (sink, stream) = DeltaStream::channel();

        tokio::spawn(async move {
            for (chunk, delay) in chunks.into_iter().zip(delays) {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        sink.send(StreamEvent::Error(ProviderError::Cancelled.to_string())).await;
                        return;
                    }
                    _ = sink.closed() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                if !sink.send(StreamEvent::Delta(chunk)).await {
                    return;
                }
            }
            sink.send(StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
                usage: Some(usage),
            })
            .await;
        });

        Ok(stream)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(spec_for(self.kind)
            .models
            .iter()
            .map(|m| ModelInfo {
                id: m.id.to_string(),
                name: Some(m.name.to_string()),
                provider: self.kind,
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn display_name(&self) -> &str {
        "Mock"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn is_mock(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
