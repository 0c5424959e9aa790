//! Error types for vchat-api

use thiserror::Error;

/// Result type alias using vchat-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered a REST call with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Stream endpoint answered with a non-success status
    #[error("Stream connection failed with status {0}")]
    StreamStatus(u16),

    /// Backend reported an error inside the stream
    #[error("Stream error: {0}")]
    Remote(String),

    /// Send succeeded but the response carried no stream id
    #[error("Stream id missing in response")]
    MissingStreamId,

    /// Request was rejected and no credentials are available to retry it
    #[error("Unauthorized")]
    Unauthorized,

    /// Access token could not be refreshed; stored credentials were cleared
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Credential storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build an API error from a status code and response body.
    ///
    /// The backend wraps failures as `{"error": "..."}`; that message is used
    /// when present, otherwise the raw body.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        Self::Api { status, message }
    }

    /// Check if this error is retryable.
    ///
    /// Only "service unavailable" answers are retried; everything else is
    /// surfaced to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Api { status: 503, .. })
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::StreamStatus(status) => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_uses_backend_message() {
        let e = Error::api(404, r#"{"error": "Conversation not found"}"#);
        match e {
            Error::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Conversation not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_body() {
        let e = Error::api(500, "Internal Server Error");
        assert_eq!(e.to_string(), "API error (500): Internal Server Error");
    }

    #[test]
    fn test_only_503_is_retryable() {
        assert!(Error::api(503, "Service temporarily unavailable").is_retryable());
        assert!(!Error::api(500, "boom").is_retryable());
        assert!(!Error::api(401, "nope").is_retryable());
        assert!(!Error::StreamStatus(503).is_retryable());
        assert!(!Error::MissingStreamId.is_retryable());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(Error::api(502, "").status(), Some(502));
        assert_eq!(Error::StreamStatus(404).status(), Some(404));
        assert_eq!(Error::SessionExpired.status(), None);
    }
}
