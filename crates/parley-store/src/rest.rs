//! Hosted backend client speaking PostgREST conventions (`/rest/v1/<table>`
//! with `eq.`/`ilike.` filters) plus password sign-in at `/auth/v1/token`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use parley_core::config::BackendConfig;
use parley_core::types::{Chat, ChatUpdate, Plan, StoredMessage, Subscription};

use crate::backend::ChatBackend;
use crate::error::StoreError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ─────────────────────────────────────────────
// Rows
// ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ChatRow {
    id: String,
    user_id: String,
    title: String,
    #[serde(default)]
    preview: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Chat {
            id: row.id,
            title: row.title,
            preview: row.preview.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatPatch<'a> {
    #[serde(flatten)]
    update: &'a ChatUpdate,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SubscriptionRow {
    user_id: String,
    plan: Plan,
    chat_limit: u32,
    current_count: u32,
}

/// Result of a password sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

// ─────────────────────────────────────────────
// RestBackend
// ─────────────────────────────────────────────

/// Client for the hosted database.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    /// Session token; requests fall back to the anon key without one.
    access_token: RwLock<Option<String>>,
    use_quota_rpc: bool,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("use_quota_rpc", &self.use_quota_rpc)
            .finish()
    }
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        RestBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: RwLock::new(None),
            use_quota_rpc: false,
        }
    }

    /// Build from the `backend` config section. `None` when no URL/key is set.
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let backend = RestBackend::new(&config.url, &config.anon_key)
            .with_quota_rpc(config.use_quota_rpc)
            .with_access_token(config.access_token.clone());
        Some(backend)
    }

    pub fn with_quota_rpc(mut self, enabled: bool) -> Self {
        self.use_quota_rpc = enabled;
        self
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = RwLock::new(token);
        self
    }

    /// Sign in with email + password; later requests carry the session token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let response = self
            .client
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Sign-in rejected");
            return Err(StoreError::Auth(error_message(status, &body)));
        }

        let session: AuthSession = response.json().await?;
        *self.access_token.write().await = Some(session.access_token.clone());
        info!(user = %session.user.id, "Signed in");
        Ok(session)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.access_token.read().await.clone();
        let bearer = token.unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, self.table_url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Backend error");
        let message = error_message(status, &body);
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(StoreError::Unavailable(message));
        }
        Err(StoreError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        let response = self.send(builder).await?;
        Ok(response.json().await?)
    }

    async fn fetch_chats(&self, query: &[(&str, String)]) -> Result<Vec<Chat>, StoreError> {
        let builder = self
            .request(Method::GET, "chats")
            .await
            .query(&[("select", "*"), ("order", "updated_at.desc")])
            .query(query);
        let rows: Vec<ChatRow> = self.fetch(builder).await?;
        Ok(rows.into_iter().map(Chat::from).collect())
    }
}

/// PostgREST puts the reason in `message`; auth errors use `error_description`.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error_description", "msg"]
                .iter()
                .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(String::from))
        })
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Escape LIKE metacharacters in user text. `*` becomes the single-character
/// wildcard `_` since PostgREST always reads it as `%`.
fn like_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('_'),
            c => out.push(c),
        }
    }
    out
}

#[async_trait]
impl ChatBackend for RestBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let builder = self
            .request(Method::GET, "chats")
            .await
            .query(&[("select", "id"), ("limit", "1")])
            .timeout(Duration::from_secs(5));
        let response = builder.send().await?;
        if response.status().is_server_error() {
            return Err(StoreError::Unavailable(format!(
                "probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        self.fetch_chats(&[("user_id", eq(user_id))]).await
    }

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let chats = self
            .fetch_chats(&[("id", eq(chat_id)), ("user_id", eq(user_id))])
            .await?;
        let Some(mut chat) = chats.into_iter().next() else {
            return Ok(None);
        };
        chat.messages = self.list_messages(chat_id).await?;
        Ok(Some(chat))
    }

    async fn insert_chat(&self, user_id: &str, chat: &Chat) -> Result<Chat, StoreError> {
        let row = ChatRow {
            id: chat.id.clone(),
            user_id: user_id.to_string(),
            title: chat.title.clone(),
            preview: Some(chat.preview.clone()),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        };
        let builder = self
            .request(Method::POST, "chats")
            .await
            .header("Prefer", "return=representation")
            .json(&row);
        let rows: Vec<ChatRow> = self.fetch(builder).await?;
        debug!(chat = %chat.id, "Chat inserted");
        rows.into_iter()
            .next()
            .map(Chat::from)
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))
    }

    async fn update_chat(
        &self,
        user_id: &str,
        chat_id: &str,
        update: &ChatUpdate,
    ) -> Result<Chat, StoreError> {
        let patch = ChatPatch {
            update,
            updated_at: Utc::now(),
        };
        let builder = self
            .request(Method::PATCH, "chats")
            .await
            .query(&[("id", eq(chat_id)), ("user_id", eq(user_id))])
            .header("Prefer", "return=representation")
            .json(&patch);
        let rows: Vec<ChatRow> = self.fetch(builder).await?;
        rows.into_iter()
            .next()
            .map(Chat::from)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_string()))
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<(), StoreError> {
        let owned = self
            .fetch_chats(&[("id", eq(chat_id)), ("user_id", eq(user_id))])
            .await?;
        if owned.is_empty() {
            return Err(StoreError::NotFound(chat_id.to_string()));
        }

        // Messages first so none are orphaned even without a database cascade.
        let builder = self
            .request(Method::DELETE, "messages")
            .await
            .query(&[("chat_id", eq(chat_id))]);
        self.send(builder).await?;

        let builder = self
            .request(Method::DELETE, "chats")
            .await
            .query(&[("id", eq(chat_id)), ("user_id", eq(user_id))])
            .header("Prefer", "return=representation");
        let rows: Vec<ChatRow> = self.fetch(builder).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(chat_id.to_string()));
        }
        debug!(chat = %chat_id, "Chat deleted");
        Ok(())
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<StoredMessage, StoreError> {
        let builder = self
            .request(Method::POST, "messages")
            .await
            .header("Prefer", "return=representation")
            .json(message);
        let rows: Vec<StoredMessage> = self.fetch(builder).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".into()))
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let builder = self
            .request(Method::GET, "messages")
            .await
            .query(&[
                ("select", "*".to_string()),
                ("chat_id", eq(chat_id)),
                ("order", "created_at.asc".to_string()),
            ]);
        self.fetch(builder).await
    }

    async fn search_chats(&self, user_id: &str, query: &str) -> Result<Vec<Chat>, StoreError> {
        let needle = query.to_lowercase();
        let chats = self
            .fetch_chats(&[
                ("user_id", eq(user_id)),
                ("title", format!("ilike.*{}*", like_literal(query))),
            ])
            .await?;
        // `*` can't be escaped in a PostgREST pattern, so the server match is
        // loose and the literal check happens here.
        Ok(chats
            .into_iter()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .collect())
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, StoreError> {
        let builder = self
            .request(Method::GET, "subscriptions")
            .await
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
            ]);
        let rows: Vec<SubscriptionRow> = self.fetch(builder).await?;
        Ok(rows.into_iter().next().map(|row| Subscription {
            plan: row.plan,
            chat_limit: row.chat_limit,
            current_count: row.current_count,
        }))
    }

    async fn save_subscription(
        &self,
        user_id: &str,
        subscription: &Subscription,
    ) -> Result<(), StoreError> {
        let row = SubscriptionRow {
            user_id: user_id.to_string(),
            plan: subscription.plan,
            chat_limit: subscription.chat_limit,
            current_count: subscription.current_count,
        };
        let builder = self
            .request(Method::POST, "subscriptions")
            .await
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.send(builder).await?;
        Ok(())
    }

    async fn check_chat_limit(
        &self,
        user_id: &str,
        default_limit: u32,
    ) -> Result<bool, StoreError> {
        if !self.use_quota_rpc {
            return Ok(self
                .get_subscription(user_id)
                .await?
                .unwrap_or_else(|| Subscription::free(default_limit))
                .can_create_chat());
        }
        let builder = self
            .request(Method::POST, "rpc/check_chat_limit")
            .await
            .json(&serde_json::json!({ "user_id": user_id }));
        let allowed: serde_json::Value = self.fetch(builder).await?;
        allowed
            .as_bool()
            .ok_or_else(|| StoreError::Decode(format!("check_chat_limit returned {allowed}")))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::Author;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_row(id: &str, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": "u1",
            "title": title,
            "preview": null,
            "created_at": "2026-01-01T10:00:00Z",
            "updated_at": "2026-01-01T10:05:00Z"
        })
    }

    #[tokio::test]
    async fn test_list_chats_sends_filters_and_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("order", "updated_at.desc"))
            .and(header("apikey", "anon"))
            .and(header("Authorization", "Bearer anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([chat_row("c1", "Hello")])))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        let chats = backend.list_chats("u1").await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "Hello");
        assert_eq!(chats[0].preview, "");
    }

    #[tokio::test]
    async fn test_get_chat_with_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .and(query_param("id", "eq.c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([chat_row("c1", "Hello")])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("chat_id", "eq.c1"))
            .and(query_param("order", "created_at.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "chat_id": "c1", "role": "user", "content": "hi", "created_at": "2026-01-01T10:00:00Z"},
                {"id": "m2", "chat_id": "c1", "role": "assistant", "content": "hello", "created_at": "2026-01-01T10:00:01Z"}
            ])))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        let chat = backend.get_chat("u1", "c1").await.unwrap().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].role, Author::Assistant);
    }

    #[tokio::test]
    async fn test_delete_removes_messages_then_chat() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/messages"))
            .and(query_param("chat_id", "eq.c1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/chats"))
            .and(query_param("id", "eq.c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([chat_row("c1", "Hello")])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .and(query_param("id", "eq.c1"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([chat_row("c1", "Hello")])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        backend.delete_chat("u1", "c1").await.unwrap();

        let received = server.received_requests().await.unwrap();
        let order: Vec<(String, &str)> = received
            .iter()
            .map(|r| (r.method.to_string(), r.url.path()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("GET".to_string(), "/rest/v1/chats"),
                ("DELETE".to_string(), "/rest/v1/messages"),
                ("DELETE".to_string(), "/rest/v1/chats"),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_chat_keeps_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .and(query_param("id", "eq.someone-elses-chat"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/chats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        let err = backend
            .delete_chat("u1", "someone-elses-chat")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref id) if id == "someone-elses-chat"));
    }

    #[test]
    fn test_like_literal_escapes_wildcards() {
        assert_eq!(like_literal("50% off"), "50\\% off");
        assert_eq!(like_literal("snake_case"), "snake\\_case");
        assert_eq!(like_literal("a*b"), "a_b");
        assert_eq!(like_literal("plain"), "plain");
    }

    #[tokio::test]
    async fn test_search_matches_literally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .and(query_param("title", "ilike.*a_b*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                chat_row("c1", "Compare A*B"),
                chat_row("c2", "acb notes")
            ])))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        let chats = backend.search_chats("u1", "a*b").await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, "c1");
    }

    #[tokio::test]
    async fn test_sign_in_token_used_afterwards() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(body_partial_json(json!({"email": "a@b.c"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "jwt-123",
                "token_type": "bearer",
                "user": {"id": "u1", "email": "a@b.c"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/subscriptions"))
            .and(header("Authorization", "Bearer jwt-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "u1", "plan": "plus", "chat_limit": 5, "current_count": 9}
            ])))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        let session = backend.sign_in("a@b.c", "secret").await.unwrap();
        assert_eq!(session.user.id, "u1");

        let sub = backend.get_subscription("u1").await.unwrap().unwrap();
        assert_eq!(sub.plan, Plan::Plus);
    }

    #[tokio::test]
    async fn test_sign_in_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        match backend.sign_in("a@b.c", "wrong").await {
            Err(StoreError::Auth(msg)) => assert_eq!(msg, "Invalid login credentials"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quota_rpc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/check_chat_limit"))
            .and(body_partial_json(json!({"user_id": "u1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon").with_quota_rpc(true);
        assert!(!backend.check_chat_limit("u1", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/chats"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = RestBackend::new(&server.uri(), "anon");
        match backend.list_chats("u1").await {
            Err(StoreError::Backend { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "JWT expired");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(backend.list_messages("c1").await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_unreachable_is_unavailable() {
        let backend = RestBackend::new("http://127.0.0.1:1", "anon");
        assert!(backend.probe().await.unwrap_err().is_unavailable());
        assert!(backend.list_chats("u1").await.unwrap_err().is_unavailable());
    }
}
