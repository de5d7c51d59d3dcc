//! The storage seam: every backend (hosted or in-memory) implements
//! [`ChatBackend`] with the same semantics.

use async_trait::async_trait;

use parley_core::types::{Chat, ChatUpdate, StoredMessage, Subscription};

use crate::error::StoreError;

/// Row-level chat persistence for one user at a time.
///
/// Business rules (quota, title derivation, validation) live in
/// [`ChatStore`](crate::ChatStore), not here.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name for logs (`"remote"`, `"mirror"`).
    fn name(&self) -> &'static str;

    /// Cheap connectivity check.
    async fn probe(&self) -> Result<(), StoreError>;

    /// The user's chats, most recently updated first, without messages.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError>;

    /// One chat with its messages in send order.
    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<Chat>, StoreError>;

    async fn insert_chat(&self, user_id: &str, chat: &Chat) -> Result<Chat, StoreError>;

    /// Apply `update` and bump `updated_at`. `NotFound` if the chat is gone.
    async fn update_chat(
        &self,
        user_id: &str,
        chat_id: &str,
        update: &ChatUpdate,
    ) -> Result<Chat, StoreError>;

    /// Delete a chat and all of its messages.
    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError>;

    async fn insert_message(&self, message: &StoredMessage) -> Result<StoredMessage, StoreError>;

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Chats whose title contains `query`, case-insensitively.
    async fn search_chats(&self, user_id: &str, query: &str) -> Result<Vec<Chat>, StoreError>;

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, StoreError>;

    async fn save_subscription(
        &self,
        user_id: &str,
        subscription: &Subscription,
    ) -> Result<(), StoreError>;

    /// Whether the user may create another chat.
    ///
    /// Users without a subscription row are treated as free with
    /// `default_limit`.
    async fn check_chat_limit(
        &self,
        user_id: &str,
        default_limit: u32,
    ) -> Result<bool, StoreError> {
        Ok(self
            .get_subscription(user_id)
            .await?
            .unwrap_or_else(|| Subscription::free(default_limit))
            .can_create_chat())
    }
}
