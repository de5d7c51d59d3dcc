//! `Conversation`: the send-message flow joining the chat store and the
//! assistant.
//!
//! 1. Pick or create the chat (quota enforced on creation)
//! 2. Persist the user message
//! 3. Generate the reply, streaming deltas to the caller
//! 4. Persist the assistant reply

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use parley_core::types::{Author, StoredMessage, StreamEvent, UsageInfo};
use parley_core::CancellationToken;
use parley_providers::ProviderError;
use parley_store::{ChatStore, StoreError};

use crate::assistant::Assistant;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The caller cancelled mid-generation. Nothing was persisted for the reply.
    #[error("generation cancelled")]
    Cancelled { partial: String },
}

impl ConversationError {
    /// Whether the user must upgrade before creating another chat.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, ConversationError::Store(StoreError::LimitExceeded { .. }))
    }
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub chat_id: String,
    /// Whether this send created the chat.
    pub created_chat: bool,
    pub reply: String,
    pub usage: Option<UsageInfo>,
    pub mock: bool,
}

/// Runs user turns against a store and an assistant.
#[derive(Debug, Clone)]
pub struct Conversation {
    store: Arc<ChatStore>,
    assistant: Arc<Assistant>,
    streaming: bool,
}

impl Conversation {
    pub fn new(store: Arc<ChatStore>, assistant: Arc<Assistant>) -> Self {
        Conversation {
            store,
            assistant,
            streaming: true,
        }
    }

    /// Ask for complete replies instead of streams. `on_delta` then receives
    /// the whole reply once.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    /// Send `text` to `chat_id` (or a new chat when `None`).
    ///
    /// `on_delta` sees each piece of the reply in arrival order. Cancelling
    /// `cancel` stops generation and returns [`ConversationError::Cancelled`].
    pub async fn send<F>(
        &self,
        chat_id: Option<&str>,
        text: &str,
        cancel: CancellationToken,
        mut on_delta: F,
    ) -> Result<SendOutcome, ConversationError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let (chat, created_chat) = match chat_id {
            Some(id) => (self.store.get_chat(id).await?, false),
            None => (self.store.create_chat(None).await?, true),
        };
        let history = chat.messages;

        self.store.add_message(&chat.id, Author::User, text).await?;
        debug!(chat = %chat.id, history = history.len(), "User message stored");

        let (reply, usage) = if self.streaming {
            self.stream_reply(&history, text, cancel, &mut on_delta).await?
        } else {
            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ConversationError::Cancelled {
                        partial: String::new(),
                    });
                }
                response = self.assistant.reply(&history, text) => response?,
            };
            on_delta(&response.content);
            (response.content, response.usage)
        };

        self.store
            .add_message(&chat.id, Author::Assistant, &reply)
            .await?;
        info!(
            chat = %chat.id,
            chars = reply.len(),
            mock = self.assistant.is_mock(),
            "Reply stored"
        );

        Ok(SendOutcome {
            chat_id: chat.id,
            created_chat,
            reply,
            usage,
            mock: self.assistant.is_mock(),
        })
    }

    async fn stream_reply<F>(
        &self,
        history: &[StoredMessage],
        text: &str,
        cancel: CancellationToken,
        on_delta: &mut F,
    ) -> Result<(String, Option<UsageInfo>), ConversationError>
    where
        F: FnMut(&str),
    {
        let mut stream = self
            .assistant
            .reply_stream(history, text, cancel.clone())
            .await?;

        let mut reply = String::new();
        while let Some(event) = stream.next_event().await {
            // Events may already be queued when the caller cancels.
            if cancel.is_cancelled() {
                return Err(ConversationError::Cancelled { partial: reply });
            }
            match event {
                StreamEvent::Delta(delta) => {
                    reply.push_str(&delta);
                    on_delta(&delta);
                }
                StreamEvent::Done { usage, .. } => return Ok((reply, usage)),
                StreamEvent::Error(message) => {
                    if cancel.is_cancelled() {
                        return Err(ConversationError::Cancelled { partial: reply });
                    }
                    warn!(error = %message, "Generation failed");
                    return Err(ProviderError::Stream(message).into());
                }
            }
        }
        Err(ProviderError::Stream("stream closed without a terminal event".into()).into())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
