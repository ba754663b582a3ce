//! Error types shared by the embedding, LLM and vector-index clients.

use thiserror::Error;

/// Result type for backend-client operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised by the out-of-process RAG collaborators.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP call itself failed (connection, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The collaborator responded with a non-2xx status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body didn't match the expected schema.
    #[error("malformed response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            BackendError::Network(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}
