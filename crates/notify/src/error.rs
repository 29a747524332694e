//! Error types for the notification system.

use matrix_client::MatrixError;
use thiserror::Error;

/// Errors that can occur when sending notifications.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The Matrix homeserver rejected a call or could not be reached
    #[error("Matrix request failed: {0}")]
    Matrix(#[from] MatrixError),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A notification state with no icon or color mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no icon or color for state {0}")]
pub struct StateError(pub String);
