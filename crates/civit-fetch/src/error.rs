use std::path::PathBuf;

use civit_api::Retryable;
use thiserror::Error;

/// Errors that can be returned by civit-fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server answered with a status that is neither 200 nor 206.
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// The downloaded bytes do not match the SHA256 CivitAI published.
    #[error("SHA256 mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A retryable error persisted past the retry budget.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Io { path: path.into(), source }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(FetchError::Status { status: 503, url: "u".into() }.is_retryable());
        assert!(FetchError::Status { status: 429, url: "u".into() }.is_retryable());
        assert!(!FetchError::Status { status: 403, url: "u".into() }.is_retryable());
        let mismatch = FetchError::HashMismatch {
            path: "a".into(),
            expected: "00".into(),
            actual: "11".into(),
        };
        assert!(!mismatch.is_retryable());
    }
}
