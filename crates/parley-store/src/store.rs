//! `ChatStore`: the chat/database facade.
//!
//! Applies the business rules (quota, title derivation, rename validation,
//! upgrades) on top of a [`ChatBackend`], and picks the backend per
//! operation according to [`StoreMode`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::config::{BackendConfig, StoreMode};
use parley_core::types::{
    derive_preview, derive_title, Author, Chat, ChatUpdate, Plan, StoredMessage, Subscription,
    DEFAULT_CHAT_TITLE,
};

use crate::backend::ChatBackend;
use crate::error::StoreError;
use crate::memory::MemoryBackend;
use crate::rest::RestBackend;

/// Cached result of the last connectivity probe.
#[derive(Debug, Clone, Copy)]
struct ProbeState {
    online: bool,
    checked_at: Instant,
}

/// Tunables for a [`ChatStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub user_id: String,
    pub mode: StoreMode,
    pub probe_ttl: Duration,
    pub free_chat_limit: u32,
}

impl From<&BackendConfig> for StoreOptions {
    fn from(config: &BackendConfig) -> Self {
        StoreOptions {
            user_id: config.user_id.clone(),
            mode: config.mode,
            probe_ttl: Duration::from_secs(config.probe_ttl_secs),
            free_chat_limit: config.free_chat_limit,
        }
    }
}

/// Chat persistence with quota enforcement and mirror fallback.
pub struct ChatStore {
    remote: Option<Arc<dyn ChatBackend>>,
    mirror: Arc<dyn ChatBackend>,
    options: StoreOptions,
    probe: Mutex<Option<ProbeState>>,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("options", &self.options)
            .finish()
    }
}

impl ChatStore {
    pub fn new(
        remote: Option<Arc<dyn ChatBackend>>,
        mirror: Arc<dyn ChatBackend>,
        options: StoreOptions,
    ) -> Self {
        ChatStore {
            remote,
            mirror,
            options,
            probe: Mutex::new(None),
        }
    }

    /// Build from the `backend` config section.
    ///
    /// Without a URL and key there is no remote, so `Auto` behaves like
    /// `Mirror`.
    pub fn from_config(config: &BackendConfig) -> Self {
        let remote = RestBackend::from_config(config).map(|r| Arc::new(r) as Arc<dyn ChatBackend>);
        if remote.is_none() && config.mode != StoreMode::Mirror {
            info!("No backend configured, chats are kept in memory");
        }
        Self::new(remote, Arc::new(MemoryBackend::new()), StoreOptions::from(config))
    }

    /// A store that only ever uses a fresh in-memory mirror.
    pub fn in_memory(user_id: &str, free_chat_limit: u32) -> Self {
        Self::new(
            None,
            Arc::new(MemoryBackend::new()),
            StoreOptions {
                user_id: user_id.to_string(),
                mode: StoreMode::Mirror,
                probe_ttl: Duration::from_secs(30),
                free_chat_limit,
            },
        )
    }

    pub fn mode(&self) -> StoreMode {
        self.options.mode
    }

    pub fn user_id(&self) -> &str {
        &self.options.user_id
    }

    // ── Backend selection ──

    /// Whether the remote answered its probe, re-probing once the cached
    /// result is older than the TTL.
    async fn remote_online(&self, remote: &Arc<dyn ChatBackend>) -> bool {
        let mut probe = self.probe.lock().await;
        if let Some(state) = *probe {
            if state.checked_at.elapsed() < self.options.probe_ttl {
                return state.online;
            }
        }
        let online = match remote.probe().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Backend probe failed, using local mirror");
                false
            }
        };
        *probe = Some(ProbeState {
            online,
            checked_at: Instant::now(),
        });
        online
    }

    async fn mark_offline(&self) {
        *self.probe.lock().await = Some(ProbeState {
            online: false,
            checked_at: Instant::now(),
        });
    }

    /// The backend the next operation should use.
    async fn select(&self) -> Result<Arc<dyn ChatBackend>, StoreError> {
        match (self.options.mode, &self.remote) {
            (StoreMode::Mirror, _) | (StoreMode::Auto, None) => Ok(self.mirror.clone()),
            (StoreMode::Remote, None) => Err(StoreError::Unavailable(
                "no remote backend configured".to_string(),
            )),
            (StoreMode::Remote, Some(remote)) => Ok(remote.clone()),
            (StoreMode::Auto, Some(remote)) => {
                if self.remote_online(remote).await {
                    Ok(remote.clone())
                } else {
                    Ok(self.mirror.clone())
                }
            }
        }
    }

    /// Name of the backend currently in use (`"remote"` or `"mirror"`).
    pub async fn active_backend(&self) -> &'static str {
        match self.select().await {
            Ok(backend) => backend.name(),
            Err(_) => "none",
        }
    }

    /// Run `op` on the selected backend. In `Auto` mode an unreachable
    /// remote is marked offline and the operation replayed on the mirror.
    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn ChatBackend>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let backend = self.select().await?;
        let on_remote = !Arc::ptr_eq(&backend, &self.mirror);
        match f(backend).await {
            Err(e) if e.is_unavailable() && on_remote && self.options.mode == StoreMode::Auto => {
                warn!(op, error = %e, "Backend unreachable, replaying on local mirror");
                self.mark_offline().await;
                f(self.mirror.clone()).await
            }
            other => other,
        }
    }

    // ── Reads ──

    /// All chats, most recently updated first.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        let user = self.user_id();
        self.run("list_chats", |b| async move { b.list_chats(user).await })
            .await
    }

    /// One chat with its messages.
    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat, StoreError> {
        let user = self.user_id();
        self.run("get_chat", |b| async move { b.get_chat(user, chat_id).await })
            .await?
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))
    }

    /// Case-insensitive title search. A blank query lists everything.
    pub async fn search_chats(&self, query: &str) -> Result<Vec<Chat>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_chats().await;
        }
        let user = self.user_id();
        self.run("search_chats", |b| async move { b.search_chats(user, query).await })
            .await
    }

    /// The user's subscription; users without a row are on the free plan.
    pub async fn subscription(&self) -> Result<Subscription, StoreError> {
        let user = self.user_id();
        let limit = self.options.free_chat_limit;
        Ok(self
            .run("get_subscription", |b| async move { b.get_subscription(user).await })
            .await?
            .unwrap_or_else(|| Subscription::free(limit)))
    }

    // ── Writes ──

    /// Create an empty chat, enforcing the free-plan quota first.
    ///
    /// Fails with [`StoreError::LimitExceeded`] and creates nothing when the
    /// user is at the limit.
    pub async fn create_chat(&self, title: Option<&str>) -> Result<Chat, StoreError> {
        let user = self.user_id();
        let limit = self.options.free_chat_limit;
        let mut subscription = self.subscription().await?;
        let allowed = self
            .run("check_chat_limit", |b| async move { b.check_chat_limit(user, limit).await })
            .await?;
        if !allowed {
            info!(
                current = subscription.current_count,
                limit = subscription.chat_limit,
                "Chat limit reached"
            );
            return Err(StoreError::LimitExceeded {
                current: subscription.current_count,
                limit: subscription.chat_limit,
            });
        }

        let now = Utc::now();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CHAT_TITLE);
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            preview: String::new(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        let chat = &chat;
        let created = self
            .run("insert_chat", |b| async move { b.insert_chat(user, chat).await })
            .await?;

        subscription.current_count += 1;
        let subscription = &subscription;
        self.run("save_subscription", |b| async move {
            b.save_subscription(user, subscription).await
        })
        .await?;

        debug!(chat = %created.id, count = subscription.current_count, "Chat created");
        Ok(created)
    }

    /// Append a message. The first user message of a chat still titled
    /// "New Chat" also sets its title and preview.
    pub async fn add_message(
        &self,
        chat_id: &str,
        role: Author,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let user = self.user_id();
        let chat = self.get_chat(chat_id).await?;

        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let message = &message;
        let stored = self
            .run("insert_message", |b| async move { b.insert_message(message).await })
            .await?;

        let first_user_message =
            role == Author::User && !chat.messages.iter().any(|m| m.role == Author::User);
        let update = if first_user_message && chat.has_default_title() {
            ChatUpdate {
                title: Some(derive_title(content)),
                preview: Some(derive_preview(content)),
            }
        } else {
            ChatUpdate::default()
        };
        let update = &update;
        self.run("update_chat", |b| async move { b.update_chat(user, chat_id, update).await })
            .await?;

        Ok(stored)
    }

    /// Messages of a chat in send order.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        self.run("list_messages", |b| async move { b.list_messages(chat_id).await })
            .await
    }

    /// Rename a chat. Blank titles are rejected; accepted titles are trimmed.
    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidTitle);
        }
        let user = self.user_id();
        let update = ChatUpdate {
            title: Some(title.to_string()),
            preview: None,
        };
        let update = &update;
        self.run("update_chat", |b| async move { b.update_chat(user, chat_id, update).await })
            .await
    }

    /// Delete a chat and its messages.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        let user = self.user_id();
        self.run("delete_chat", |b| async move { b.delete_chat(user, chat_id).await })
            .await?;
        info!(chat = %chat_id, "Chat deleted");
        Ok(())
    }

    /// Move the user to the Plus plan.
    pub async fn upgrade(&self) -> Result<Subscription, StoreError> {
        let user = self.user_id();
        let mut subscription = self.subscription().await?;
        subscription.plan = Plan::Plus;
        let saved = &subscription;
        self.run("save_subscription", |b| async move { b.save_subscription(user, saved).await })
            .await?;
        info!("Subscription upgraded to Plus");
        Ok(subscription)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
