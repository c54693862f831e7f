//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// OTP code request failed
    #[error("OTP request failed: {0}")]
    OtpRequest(String),

    /// Wrong or expired OTP code
    #[error("Invalid OTP code: {0}")]
    InvalidOtp(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session expired and refresh failed
    #[error("Session expired")]
    SessionExpired,

    /// Session was invalidated server-side (revoked, logged out elsewhere, etc.)
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] marinda_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - HTTP errors with 5xx status codes
    /// - Connection timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Http(e) => {
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

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network_unavailable() {
        assert!(AuthError::NetworkUnavailable.is_transient());
    }

    #[test]
    fn test_is_transient_timeout() {
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_is_not_transient_invalid_otp() {
        assert!(!AuthError::InvalidOtp("wrong code".to_string()).is_transient());
    }

    #[test]
    fn test_is_not_transient_not_logged_in() {
        assert!(!AuthError::NotLoggedIn.is_transient());
    }

    #[test]
    fn test_is_not_transient_refresh_exhausted() {
        assert!(!AuthError::RefreshExhausted(3).is_transient());
    }

    #[test]
    fn test_is_not_transient_session_invalid() {
        assert!(!AuthError::SessionInvalid("revoked".to_string()).is_transient());
    }
}
