//! Conversation layer for Parley: builds provider context from stored chats
//! and runs the send-message flow.

pub mod assistant;
pub mod context;
pub mod conversation;

pub use assistant::{Assistant, AssistantStatus};
pub use context::ContextBuilder;
pub use conversation::{Conversation, ConversationError, SendOutcome};
