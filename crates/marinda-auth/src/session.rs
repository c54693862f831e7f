//! Session management with automatic token refresh using FSM-based state management.
//!
//! This module provides a `SessionManager` that uses an internal finite state
//! machine to track authentication state explicitly, rather than deriving it
//! from storage. The session itself (tokens + metadata) lives in device-local
//! storage so an app relaunch restores it.

use crate::auth_fsm::{
    AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload, RefreshConfig,
};
use crate::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use marinda_storage::{PrefsManager, SessionMeta};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Authentication status snapshot for the navigation shell.
#[derive(Debug, Clone)]
pub enum SessionStatus {
    /// Logged in with valid session.
    LoggedIn { user_id: String, expires_at: String },
    /// Not logged in.
    NotLoggedIn,
    /// Session expired and not yet refreshed.
    Expired,
}

/// Supabase OTP request.
#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

/// Supabase OTP verification request.
#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    email: &'a str,
    token: &'a str,
}

/// Supabase token refresh request.
#[derive(Debug, Serialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Supabase token grant response (shared by verify and refresh).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Supabase user verification response.
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
}

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Session manager for authentication state with FSM-based state tracking.
///
/// The FSM tracks transient states (awaiting a code, refreshing, signing out)
/// that aren't persisted, while the actual session data (tokens) is stored in
/// device-local storage. On startup, the FSM state is derived from storage for
/// crash resilience.
pub struct SessionManager {
    prefs: PrefsManager,
    supabase_url: String,
    supabase_publishable_key: String,
    http_client: Client,
    /// Internal FSM for tracking auth state transitions.
    fsm: Mutex<AuthMachine>,
    /// Configuration for refresh retry behavior.
    refresh_config: RefreshConfig,
    /// Optional callback for state change notifications.
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(
        prefs: PrefsManager,
        supabase_url: &str,
        supabase_publishable_key: &str,
    ) -> Self {
        Self {
            prefs,
            supabase_url: supabase_url.to_string(),
            supabase_publishable_key: supabase_publishable_key.to_string(),
            http_client: Client::new(),
            fsm: Mutex::new(AuthMachine::new()),
            refresh_config: RefreshConfig::default(),
            state_callback: Mutex::new(None),
        }
    }

    /// Create a new session manager with custom refresh configuration.
    pub fn with_refresh_config(
        prefs: PrefsManager,
        supabase_url: &str,
        supabase_publishable_key: &str,
        refresh_config: RefreshConfig,
    ) -> Self {
        Self {
            prefs,
            supabase_url: supabase_url.to_string(),
            supabase_publishable_key: supabase_publishable_key.to_string(),
            http_client: Client::new(),
            fsm: Mutex::new(AuthMachine::new()),
            refresh_config,
            state_callback: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of auth state changes.
    ///
    /// This is the push channel the rest of the client subscribes to; every
    /// state change overwrites downstream session-derived state.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        let mut cb = self.state_callback.lock().unwrap();
        *cb = Some(callback);
    }

    /// Get the current FSM state.
    pub fn auth_state(&self) -> AuthState {
        let fsm = self.fsm.lock().unwrap();
        AuthState::from(fsm.state())
    }

    /// Transition the FSM and notify callback if state changed.
    fn transition(&self, input: &AuthMachineInput) -> Result<AuthState, AuthError> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            self.notify_state_change(&new_state);
        }

        Ok(new_state)
    }

    /// Notify the callback of a state change.
    fn notify_state_change(&self, state: &AuthState) {
        let cb = self.state_callback.lock().unwrap();
        if let Some(callback) = cb.as_ref() {
            let (user_id, email) = self
                .prefs
                .get_session_meta()
                .ok()
                .flatten()
                .map(|m| (Some(m.user_id), m.email))
                .unwrap_or((None, None));

            callback(AuthStateChangedPayload {
                state: state.clone(),
                user_id,
                email,
            });
        }
    }

    /// Validate and refresh the persisted session on startup.
    ///
    /// This should be called once when the app starts. Always verifies the
    /// session with the Supabase server to ensure it hasn't been revoked. If
    /// the token is expired locally, attempts to refresh with exponential
    /// backoff. If refresh fails, the session is cleared. After this returns,
    /// the session store is settled regardless of outcome.
    ///
    /// Uses the FSM to track state transitions:
    /// - NotLoggedIn -> Validating -> TokenNotExpired -> VerifyingWithServer -> ServerVerified -> LoggedIn
    /// - NotLoggedIn -> Validating -> TokenNotExpired -> VerifyingWithServer -> ServerRejected -> NotLoggedIn
    /// - NotLoggedIn -> Validating -> SessionExpired -> Refreshing -> RefreshSuccess -> LoggedIn
    /// - NotLoggedIn -> Validating -> NoSession -> NotLoggedIn
    ///
    /// Returns:
    /// - `Ok(true)` if session is valid or was successfully refreshed
    /// - `Ok(false)` if no session exists
    /// - `Err(...)` if session was invalid and has been cleared
    pub async fn validate_session_on_startup(&self) -> AuthResult<bool> {
        self.transition(&AuthMachineInput::ValidateSession)?;

        if !self.prefs.has_session()? {
            info!("No existing session found on startup");
            self.transition(&AuthMachineInput::NoSession)?;
            return Ok(false);
        }

        let meta = match self.prefs.get_session_meta()? {
            Some(m) => m,
            None => {
                info!("Session tokens exist but metadata is missing, clearing session");
                self.prefs.clear_session()?;
                self.transition(&AuthMachineInput::NoSession)?;
                return Ok(false);
            }
        };

        let access_token = match self.prefs.get_access_token()? {
            Some(t) => t,
            None => {
                info!("Session metadata exists but access token is missing, clearing session");
                self.prefs.clear_session()?;
                self.transition(&AuthMachineInput::NoSession)?;
                return Ok(false);
            }
        };

        let token_expired = self.prefs.is_session_expired()?;

        if token_expired {
            info!(
                user_id = %meta.user_id,
                "Session expired on startup, attempting refresh"
            );
            self.transition(&AuthMachineInput::SessionExpired)?;

            let refresh_token = match self.prefs.get_refresh_token()? {
                Some(t) => t,
                None => {
                    warn!("Session expired but no refresh token found, clearing session");
                    self.prefs.clear_session()?;
                    self.transition(&AuthMachineInput::RefreshFailed)?;
                    return Err(AuthError::TokenRefresh(
                        "No refresh token available".to_string(),
                    ));
                }
            };

            match self.refresh_with_backoff(&refresh_token).await {
                Ok((_, user_id)) => {
                    info!(user_id = %user_id, "Session refreshed successfully on startup");
                    return Ok(true);
                }
                Err(e) => {
                    warn!("Session refresh failed on startup, session cleared: {}", e);
                    return Err(e);
                }
            }
        }

        info!(
            user_id = %meta.user_id,
            "Token not expired, verifying session with server"
        );
        self.transition(&AuthMachineInput::TokenNotExpired)?;

        match self.verify_session_with_server(&access_token).await {
            Ok(user_id) => {
                info!(
                    user_id = %user_id,
                    "Session validated on startup (verified with server)"
                );
                self.transition(&AuthMachineInput::ServerVerified)?;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    user_id = %meta.user_id,
                    error = %e,
                    "Session verification failed, clearing session"
                );
                self.prefs.clear_session()?;
                self.transition(&AuthMachineInput::ServerRejected)?;
                Err(e)
            }
        }
    }

    /// Verify the session is valid by calling the Supabase /auth/v1/user endpoint.
    ///
    /// Returns the user ID if the session is valid.
    async fn verify_session_with_server(&self, access_token: &str) -> AuthResult<String> {
        let user_url = format!("{}/auth/v1/user", self.supabase_url);

        debug!(url = %user_url, "Verifying session with Supabase");

        let response = self
            .http_client
            .get(&user_url)
            .header("apikey", &self.supabase_publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Session verification failed");

            return Err(AuthError::SessionInvalid(format!(
                "Server rejected session: HTTP {}: {}",
                status, body
            )));
        }

        let user: UserResponse = response.json().await?;
        debug!(user_id = %user.id, "Session verified with server");

        Ok(user.id)
    }

    /// Request an OTP code for an email address.
    ///
    /// Uses the FSM to track the flow:
    /// - NotLoggedIn -> AwaitingCode (resends stay in AwaitingCode)
    pub async fn request_otp(&self, email: &str) -> AuthResult<()> {
        self.transition(&AuthMachineInput::OtpRequested)?;

        let otp_url = format!("{}/auth/v1/otp", self.supabase_url);

        debug!(url = %otp_url, email = %email, "Requesting OTP code");

        let response = self
            .http_client
            .post(&otp_url)
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&OtpRequest {
                email,
                create_user: true,
            })
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let _ = self.transition(&AuthMachineInput::EntryAbandoned);
                return Err(AuthError::Http(e));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "OTP request failed");
            let _ = self.transition(&AuthMachineInput::EntryAbandoned);
            return Err(AuthError::OtpRequest(format!("HTTP {}: {}", status, body)));
        }

        info!(email = %email, "OTP code sent");
        Ok(())
    }

    /// Verify an OTP code and establish a session.
    ///
    /// Uses the FSM to track the flow:
    /// - AwaitingCode -> LoggedIn on success
    /// - AwaitingCode -> AwaitingCode on a wrong code (the user can retry)
    pub async fn verify_otp(&self, email: &str, code: &str) -> AuthResult<()> {
        let verify_url = format!("{}/auth/v1/verify", self.supabase_url);

        debug!(url = %verify_url, email = %email, "Verifying OTP code");

        let response = self
            .http_client
            .post(&verify_url)
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&VerifyRequest {
                kind: "email",
                email,
                token: code,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "OTP verification failed");
            let _ = self.transition(&AuthMachineInput::CodeRejected);
            return Err(AuthError::InvalidOtp(format!("HTTP {}: {}", status, body)));
        }

        let data: TokenResponse = response.json().await?;

        self.store_session(&data)?;
        self.transition(&AuthMachineInput::CodeVerified)?;

        info!(user_id = %data.user.id, "OTP login successful");
        Ok(())
    }

    /// Persist a token grant as the current session.
    fn store_session(&self, data: &TokenResponse) -> AuthResult<()> {
        let expires_at = Utc::now() + Duration::seconds(data.expires_in);

        self.prefs.set_access_token(&data.access_token)?;
        self.prefs.set_refresh_token(&data.refresh_token)?;
        self.prefs.set_session_meta(&SessionMeta {
            user_id: data.user.id.clone(),
            email: data.user.email.clone(),
            expires_at: expires_at.to_rfc3339(),
        })?;
        Ok(())
    }

    /// Get current authentication status.
    pub fn status(&self) -> AuthResult<SessionStatus> {
        if !self.prefs.has_session()? {
            return Ok(SessionStatus::NotLoggedIn);
        }

        let meta = self.prefs.get_session_meta()?;
        match meta {
            Some(meta) => {
                if self.prefs.is_session_expired()? {
                    Ok(SessionStatus::Expired)
                } else {
                    Ok(SessionStatus::LoggedIn {
                        user_id: meta.user_id,
                        expires_at: meta.expires_at,
                    })
                }
            }
            None => Ok(SessionStatus::NotLoggedIn),
        }
    }

    /// Check if user is logged in (with valid, non-expired session).
    pub fn is_logged_in(&self) -> AuthResult<bool> {
        if !self.prefs.has_session()? {
            return Ok(false);
        }

        if self.prefs.is_session_expired()? {
            return Ok(false);
        }

        Ok(true)
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// Returns the access token and user ID if successful.
    pub async fn get_valid_token(&self) -> AuthResult<(String, String)> {
        if !self.prefs.has_session()? {
            return Err(AuthError::NotLoggedIn);
        }

        let access_token = self
            .prefs
            .get_access_token()?
            .ok_or(AuthError::NotLoggedIn)?;
        let refresh_token = self
            .prefs
            .get_refresh_token()?
            .ok_or(AuthError::NotLoggedIn)?;
        let meta = self
            .prefs
            .get_session_meta()?
            .ok_or(AuthError::NotLoggedIn)?;

        if !self.prefs.is_session_expired()? {
            debug!("Token still valid");
            return Ok((access_token, meta.user_id));
        }

        info!("Token expired, attempting refresh");
        self.transition(&AuthMachineInput::TokenExpired)?;

        self.refresh_with_backoff(&refresh_token).await
    }

    /// Refresh the session with exponential backoff retry.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> AuthResult<(String, String)> {
        let mut last_error = None;

        for attempt in 0..self.refresh_config.max_retries {
            match self.try_refresh(refresh_token).await {
                Ok(result) => {
                    self.transition(&AuthMachineInput::RefreshSuccess)?;
                    return Ok(result);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < self.refresh_config.max_retries {
                        // Signal retry (stays in Refreshing state)
                        let _ = self.transition(&AuthMachineInput::RefreshRetry);

                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis(),
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!("Refresh failed with non-transient error: {}", e);
                    self.prefs.clear_session()?;
                    self.transition(&AuthMachineInput::RefreshFailed)?;
                    return Err(e);
                }
            }
        }

        warn!(
            "Refresh failed after {} attempts",
            self.refresh_config.max_retries
        );
        self.prefs.clear_session()?;
        self.transition(&AuthMachineInput::RefreshFailed)?;

        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries)))
    }

    /// Single attempt to refresh the session.
    async fn try_refresh(&self, refresh_token: &str) -> AuthResult<(String, String)> {
        let refresh_url = format!(
            "{}/auth/v1/token?grant_type=refresh_token",
            self.supabase_url
        );

        debug!(url = %refresh_url, "Refreshing token");

        let response = self
            .http_client
            .post(&refresh_url)
            .header("apikey", &self.supabase_publishable_key)
            .header("Content-Type", "application/json")
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Token refresh failed");

            // Don't clear session here - the caller decides based on retry logic
            return Err(AuthError::TokenRefresh(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let data: TokenResponse = response.json().await?;
        self.store_session(&data)?;

        info!(user_id = %data.user.id, "Token refreshed successfully");

        Ok((data.access_token.clone(), data.user.id.clone()))
    }

    /// Sign out by revoking the session server-side and clearing all local
    /// session data.
    ///
    /// The server call is best-effort; local data is cleared regardless.
    pub async fn sign_out(&self) -> AuthResult<()> {
        // Try to transition - if we're not in LoggedIn state, clear storage anyway
        let _ = self.transition(&AuthMachineInput::SignOutRequested);

        if let Ok(Some(access_token)) = self.prefs.get_access_token() {
            let logout_url = format!("{}/auth/v1/logout", self.supabase_url);
            let result = self
                .http_client
                .post(&logout_url)
                .header("apikey", &self.supabase_publishable_key)
                .header("Authorization", format!("Bearer {}", access_token))
                .send()
                .await;

            if let Err(e) = result {
                warn!(error = %e, "Server-side logout failed, clearing local session anyway");
            }
        }

        self.prefs.clear_session()?;

        let _ = self.transition(&AuthMachineInput::SignOutComplete);

        info!("Signed out");
        Ok(())
    }

    /// Get the current user ID if logged in.
    pub fn user_id(&self) -> AuthResult<Option<String>> {
        match self.prefs.get_session_meta()? {
            Some(meta) => Ok(Some(meta.user_id)),
            None => Ok(None),
        }
    }
}
