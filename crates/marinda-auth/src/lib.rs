//! Session lifecycle for the Marinda client core.
//!
//! This crate provides:
//! - OTP login (code request + verification) against Supabase Auth
//! - Startup session restoration with automatic token refresh
//! - Integration with device-local storage for session persistence
//! - Explicit FSM-based auth state management
//! - Push notification of auth state changes via a callback

mod auth_fsm;
mod error;
mod session;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload,
    RefreshConfig,
};
pub use error::{AuthError, AuthResult};
pub use session::{AuthStateCallback, SessionManager, SessionStatus};
