//! Shared HTTP plumbing: client construction and error-body extraction.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, warn};

use crate::error::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the pooled client used by an adapter.
///
/// Only the connect phase is bounded here. Whole-request timeouts are set per
/// non-streaming request so long streams are not cut off.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Turn a non-2xx response into `ProviderError::Api`.
pub(crate) async fn error_from_response(
    provider: &str,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!(provider, status = %status, body = %body, "API error");
    ProviderError::Api {
        status: status.as_u16(),
        message: api_error_message(status, &body),
    }
}

/// `error.message` from a JSON error body, else `HTTP {status}: {reason}`.
pub(crate) fn api_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}
