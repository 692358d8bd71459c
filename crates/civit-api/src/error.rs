use std::time::Duration;

use thiserror::Error;

/// Errors that can be returned by civit-api operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An HTTP request failed at the transport level (connect, timeout, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to deserialize a response body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API answered 404 for the requested resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered 429 and retries were exhausted.
    #[error("rate limited by CivitAI (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-success status.
    #[error("unexpected HTTP status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    /// A request URL could not be built from the configured base URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A caller-supplied argument was rejected before any request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The response was well-formed JSON but missing something we need.
    #[error("Invalid CivitAI API response: {message}")]
    InvalidResponse { message: String },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Classifies an error for [`crate::retry::RetryPolicy`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-mandated wait that overrides the backoff schedule.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            ApiError::RateLimited { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Parse a `Retry-After` header value given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_retryability() {
        let e = ApiError::Status { status: 503, url: "u".into(), body: String::new() };
        assert!(e.is_retryable());
        let e = ApiError::Status { status: 400, url: "u".into(), body: String::new() };
        assert!(!e.is_retryable());
        assert!(!ApiError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let e = ApiError::RateLimited { retry_after: Some(Duration::from_secs(3)) };
        assert!(e.is_retryable());
        assert_eq!(e.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
