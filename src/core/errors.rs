//! Error types for the chat client.

use thiserror::Error;

use crate::core::ids::SlugError;
use crate::storage::StorageError;

/// Chat client error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The stream endpoint answered the open request with a non-success status.
    #[error("stream open failed ({status}): {message}")]
    OpenFailed {
        /// HTTP status code returned by the server.
        status: u16,
        /// Server-provided body, or `HTTP <status>` when the body was empty.
        message: String,
    },
    /// No response headers arrived within the configured open timeout.
    #[error("stream open timed out after {0} ms")]
    OpenTimeout(u64),
    /// The connection dropped or the body could not be read mid-stream.
    #[error("stream transport error: {0}")]
    Transport(String),
    /// HTTP client error.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// A REST call returned a non-success status.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// Persistence collaborator error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Invalid argument supplied by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A send was issued while another stream is still active.
    #[error("a stream is already in progress")]
    StreamInProgress,
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    /// Whether the error happened before the stream was considered open.
    #[must_use]
    pub const fn is_open_failure(&self) -> bool {
        matches!(self, Self::OpenFailed { .. } | Self::OpenTimeout(_))
    }

    /// HTTP status attached to the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::OpenFailed { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<SlugError> for ChatError {
    fn from(err: SlugError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
