//! Error types for Matrix client calls.

use std::path::PathBuf;

use probe::CallOutcome;
use thiserror::Error;

/// Errors returned by [`crate::MatrixClient`].
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The homeserver answered with a Matrix error body
    #[error("{errcode}: {message} (HTTP {status})")]
    Api {
        status: u16,
        errcode: String,
        message: String,
    },

    /// Homeserver or admin endpoint is not a valid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `mxc://` URI that cannot be resolved
    #[error("invalid content URI: {0}")]
    InvalidContentUri(String),

    /// Reading or writing the credential cache failed
    #[error("credential cache {}: {source}", path.display())]
    CredentialCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response was well-formed but missing something we need
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl MatrixError {
    /// Matrix error code, if the server sent one.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            Self::Api { errcode, .. } => Some(errcode),
            _ => None,
        }
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// Transport failures, rate limiting, server errors and `M_NOT_FOUND`
    /// (the usual answer while an event or room has not federated yet) are
    /// retryable. Every other Matrix error is a definite answer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder(),
            Self::Api {
                status, errcode, ..
            } => {
                *status == 429
                    || *status >= 500
                    || errcode == "M_NOT_FOUND"
                    || errcode == "M_LIMIT_EXCEEDED"
            }
            _ => false,
        }
    }
}

/// Map a client result onto the poller's three-way outcome.
pub fn call_outcome<T>(result: Result<T, MatrixError>) -> CallOutcome<T> {
    match result {
        Ok(value) => CallOutcome::Success(value),
        Err(e) if e.is_retryable() => CallOutcome::Retryable(e.to_string()),
        Err(e) => CallOutcome::Terminal(e.to_string()),
    }
}
