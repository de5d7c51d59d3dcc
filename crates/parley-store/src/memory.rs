//! In-process mirror backend.
//!
//! Same semantics as the hosted backend, kept in memory for the lifetime of
//! the process. Used when the backend is unreachable or not configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use parley_core::types::{Chat, ChatUpdate, StoredMessage, Subscription};

use crate::backend::ChatBackend;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MirrorState {
    /// chat id → (owner, chat without messages)
    chats: HashMap<String, (String, Chat)>,
    /// chat id → messages in send order
    messages: HashMap<String, Vec<StoredMessage>>,
    subscriptions: HashMap<String, Subscription>,
}

impl MirrorState {
    fn owned_chats<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Chat> + 'a {
        self.chats
            .values()
            .filter(move |(owner, _)| owner == user_id)
            .map(|(_, chat)| chat)
    }
}

/// Thread-safe in-memory store: multiple readers, exclusive writer.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MirrorState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut chats: Vec<Chat>) -> Vec<Chat> {
    chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    chats
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(state.owned_chats(user_id).cloned().collect()))
    }

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .chats
            .get(chat_id)
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, chat)| {
                let mut chat = chat.clone();
                chat.messages = state.messages.get(chat_id).cloned().unwrap_or_default();
                chat
            }))
    }

    async fn insert_chat(&self, user_id: &str, chat: &Chat) -> Result<Chat, StoreError> {
        let mut stored = chat.clone();
        stored.messages.clear();
        let mut state = self.state.write().await;
        state
            .chats
            .insert(stored.id.clone(), (user_id.to_string(), stored.clone()));
        state.messages.entry(stored.id.clone()).or_default();
        Ok(stored)
    }

    async fn update_chat(
        &self,
        user_id: &str,
        chat_id: &str,
        update: &ChatUpdate,
    ) -> Result<Chat, StoreError> {
        let mut state = self.state.write().await;
        let (_, chat) = state
            .chats
            .get_mut(chat_id)
            .filter(|(owner, _)| owner == user_id)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))?;
        if let Some(title) = &update.title {
            chat.title = title.clone();
        }
        if let Some(preview) = &update.preview {
            chat.preview = preview.clone();
        }
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let owned = state
            .chats
            .get(chat_id)
            .is_some_and(|(owner, _)| owner == user_id);
        if !owned {
            return Err(StoreError::NotFound(chat_id.to_string()));
        }
        state.messages.remove(chat_id);
        state.chats.remove(chat_id);
        Ok(())
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<StoredMessage, StoreError> {
        let mut state = self.state.write().await;
        if !state.chats.contains_key(&message.chat_id) {
            return Err(StoreError::NotFound(message.chat_id.clone()));
        }
        state
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message.clone())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let state = self.state.read().await;
        Ok(state.messages.get(chat_id).cloned().unwrap_or_default())
    }

    async fn search_chats(&self, user_id: &str, query: &str) -> Result<Vec<Chat>, StoreError> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .owned_chats(user_id)
                .filter(|c| c.title.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        ))
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self.state.read().await.subscriptions.get(user_id).cloned())
    }

    async fn save_subscription(
        &self,
        user_id: &str,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .subscriptions
            .insert(user_id.to_string(), subscription.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
