//! Authentication state machine using rust-fsm.
//!
//! This module defines an explicit finite state machine for the OTP login
//! lifecycle, replacing implicit state derivation from storage checks.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │   NotLoggedIn   │ (initial)
//! └────────┬────────┘
//!          │ OtpRequested / ValidateSession
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   AwaitingCode  │     │   Validating    │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          │ CodeVerified          │ TokenNotExpired ──► VerifyingWithServer
//!          │ (CodeRejected loops)  │                            │
//!          │                       │ SessionExpired             │ ServerVerified/ServerRejected
//!          │                       │                            │
//!          │                       │ NoSession                  ▼
//!          ▼                       ▼                     LoggedIn/NotLoggedIn
//! ┌─────────────────┐      TokenExpired      ┌─────────────────┐
//! │    LoggedIn     │ ─────────────────────► │   Refreshing    │
//! └────────┬────────┘                        └────────┬────────┘
//!          │                                          │
//!          │ SignOutRequested                         │ RefreshSuccess/RefreshFailed
//!          ▼                                          ▼
//! ┌─────────────────┐                        ┌─────────────────┐
//! │   SigningOut    │                        │  (Back to       │
//! └────────┬────────┘                        │   appropriate)  │
//!          │ SignOutComplete                 └─────────────────┘
//!          ▼
//!     NotLoggedIn
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Define the FSM using rust-fsm's declarative macro
// This generates a module `auth_machine` with:
// - auth_machine::State (enum)
// - auth_machine::Input (enum)
// - auth_machine::StateMachine (type alias)
// - auth_machine::Impl (trait impl)
state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotLoggedIn)

    NotLoggedIn => {
        SessionDetected => PendingValidation,
        OtpRequested => AwaitingCode,
        ValidateSession => Validating
    },
    PendingValidation => {
        ValidateSession => Validating,
        OtpRequested => AwaitingCode,
        NoSession => NotLoggedIn
    },
    AwaitingCode => {
        // Resending a code stays on the entry screen
        OtpRequested => AwaitingCode,
        CodeVerified => LoggedIn,
        // Wrong code - the user can retype without restarting the flow
        CodeRejected => AwaitingCode,
        EntryAbandoned => NotLoggedIn
    },
    Validating => {
        // Token not expired locally - must verify with server
        TokenNotExpired => VerifyingWithServer,
        // Token expired locally - attempt refresh
        SessionExpired => Refreshing,
        // No session exists
        NoSession => NotLoggedIn
    },
    VerifyingWithServer => {
        // Server confirmed session is valid
        ServerVerified => LoggedIn,
        // Server rejected session (revoked, invalid, etc.)
        ServerRejected => NotLoggedIn
    },
    LoggedIn => {
        TokenExpired => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSuccess => LoggedIn,
        RefreshRetry => Refreshing,
        RefreshFailed => NotLoggedIn
    },
    SigningOut => {
        SignOutComplete => NotLoggedIn
    }
}

// Re-export the generated types with clearer names
pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// User-friendly authentication state for external consumption.
///
/// This is a simplified view of the FSM state for the navigation shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Not logged in.
    NotLoggedIn,
    /// Stored credentials exist but have not yet been validated.
    PendingValidation,
    /// An OTP code was sent; waiting for the user to enter it.
    AwaitingCode,
    /// Validating existing session (checking local storage).
    Validating,
    /// Verifying session with the Supabase server.
    VerifyingWithServer,
    /// Logged in with valid session.
    LoggedIn,
    /// Refreshing expired token.
    Refreshing,
    /// Currently signing out.
    SigningOut,
}

impl AuthState {
    /// Returns true if the user has a valid session (LoggedIn state only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }

    /// Returns true while the session store has not settled yet.
    ///
    /// `AwaitingCode` is excluded: the login screen owns that wait, the
    /// session store is idle during it.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            AuthState::PendingValidation
                | AuthState::Validating
                | AuthState::VerifyingWithServer
                | AuthState::Refreshing
                | AuthState::SigningOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::PendingValidation => AuthState::PendingValidation,
            AuthMachineState::AwaitingCode => AuthState::AwaitingCode,
            AuthMachineState::Validating => AuthState::Validating,
            AuthMachineState::VerifyingWithServer => AuthState::VerifyingWithServer,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::SigningOut => AuthState::SigningOut,
        }
    }
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms.saturating_mul(2u64.pow(attempt));
        let capped_ms = delay_ms.min(self.max_delay_ms);
        Duration::from_millis(capped_ms)
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    /// User ID if logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
