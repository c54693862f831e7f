//! Backend error types.

use thiserror::Error;

/// Error type for backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Non-success response from the REST or functions API
    #[error("API error: {0}")]
    Api(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include connection failures, timeouts and 5xx
    /// server responses.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;
