//! Context builder: assembles the message list sent to the provider.

use parley_core::types::{Message, StoredMessage};
use tracing::debug;

/// Builds provider requests from a chat's history.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the full message list for an LLM call.
    ///
    /// 1. System prompt (omitted when blank)
    /// 2. Chat history in send order
    /// 3. Current user message
    pub fn build_messages(&self, history: &[StoredMessage], user_text: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !self.system_prompt.trim().is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend(history.iter().map(StoredMessage::to_message));
        messages.push(Message::user(user_text));

        debug!(history = history.len(), total = messages.len(), "Context built");
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_core::types::{Author, Role};

    fn stored(role: Author, content: &str) -> StoredMessage {
        StoredMessage {
            id: content.to_string(),
            chat_id: "c1".into(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_messages_order() {
        let ctx = ContextBuilder::new("Be helpful.");
        let history = vec![stored(Author::User, "hi"), stored(Author::Assistant, "hello")];
        let messages = ctx.build_messages(&history, "how are you?");

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[0].content, "Be helpful.");
        assert_eq!(messages[3].content, "how are you?");
    }

    #[test]
    fn test_blank_system_prompt_is_omitted() {
        let ctx = ContextBuilder::new("  ");
        let messages = ctx.build_messages(&[], "hi");
        assert_eq!(messages, vec![Message::user("hi")]);
    }
}
