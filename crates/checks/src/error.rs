//! Error types shared by the checks.

use matrix_client::MatrixError;
use thiserror::Error;

/// Failures that keep a check from evaluating its target.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Expected data is absent from a response
    #[error("missing data: {0}")]
    MissingData(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl CheckError {
    /// Read the body of a non-success response into [`CheckError::Status`].
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status { status, body }
    }
}
