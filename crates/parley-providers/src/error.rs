//! Provider error taxonomy.

use thiserror::Error;

/// Every way a provider call can fail. Nothing here is retried.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Connection, DNS or TLS failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A stream ended with an error after it started.
    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error("request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_message_only() {
        let err = ProviderError::Api {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "Invalid API key");
        assert_eq!(err.status(), Some(401));
        assert_eq!(ProviderError::Cancelled.status(), None);
    }

    #[test]
    fn test_json_error_is_decode() {
        let err: ProviderError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
