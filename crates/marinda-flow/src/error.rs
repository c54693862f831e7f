//! Flow error types.

use thiserror::Error;

/// Error type for flow operations.
///
/// Resolver fetch failures never surface here; they are logged and leave the
/// owning container unresolved. Only user-triggered operations (invite
/// accept/reject, explicit selection changes, sign-out) return errors.
#[derive(Error, Debug)]
pub enum FlowError {
    /// No authenticated identity for an operation that needs one
    #[error("Not logged in")]
    NotLoggedIn,

    /// Invite action requested with no pending invite token
    #[error("No pending invite")]
    NoPendingInvite,

    /// Auth error
    #[error("Auth error: {0}")]
    Auth(#[from] marinda_auth::AuthError),

    /// Backend error
    #[error("Backend error: {0}")]
    Backend(#[from] marinda_backend::BackendError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] marinda_storage::StorageError),
}

/// Result type alias using FlowError.
pub type FlowResult<T> = Result<T, FlowError>;
