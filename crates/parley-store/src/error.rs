//! Store error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A free-plan user already created `limit` chats.
    #[error("chat limit reached ({current}/{limit}); upgrade to Plus for unlimited chats")]
    LimitExceeded { current: u32, limit: u32 },

    #[error("chat title cannot be empty")]
    InvalidTitle,

    #[error("chat '{0}' not found")]
    NotFound(String),

    /// The backend could not be reached (connect, timeout, gateway errors).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error status.
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl StoreError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::LimitExceeded { .. } => "CHAT_LIMIT_EXCEEDED",
            StoreError::InvalidTitle => "INVALID_TITLE",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Unavailable(_) => "UNAVAILABLE",
            StoreError::Backend { .. } => "BACKEND_ERROR",
            StoreError::Decode(_) => "DECODE_ERROR",
            StoreError::Auth(_) => "AUTH_FAILED",
        }
    }

    /// Whether the mirror should take over.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}
