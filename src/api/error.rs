use std::time::Duration;
use thiserror::Error;

/// Fallback shown when the backend gives no `detail` for a failure.
pub const GENERIC_FAILURE: &str = "request failed";

/// Errors surfaced by [`ApiClient`](super::ApiClient) operations.
///
/// Every variant converts to a user-facing message via `Display`; nothing
/// past the client boundary needs to inspect transport internals.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A form field was missing or malformed; no request was sent.
    #[error("{0}")]
    Validation(String),
    /// The operation needs an access token and none is held.
    #[error("Authentication required")]
    Unauthenticated,
    /// Backend answered with a non-2xx status.
    #[error("{message} (status {status})")]
    Upstream { status: u16, message: String },
    /// Login succeeded on the wire but the token pair was incomplete.
    #[error("Authentication tokens missing from backend response")]
    MissingTokens,
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Body could not be decoded as the expected JSON shape
    #[error("Unexpected response body: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

impl ApiError {
    /// HTTP status carried by an upstream failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 401/403, which mean the presented credentials are no longer accepted.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Short message suitable for inline display.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Upstream { message, .. } => message.clone(),
            ApiError::Network(_) | ApiError::Timeout(_) => {
                "Connection error. Try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
