//! High-level API for persisted client preferences.

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};

/// Persisted session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// User ID from Supabase Auth
    pub user_id: String,
    /// User email from Supabase Auth
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (ISO timestamp)
    pub expires_at: String,
}

/// High-level API for storing and retrieving client preferences
pub struct PrefsManager {
    store: Box<dyn KeyValueStore>,
}

impl PrefsManager {
    /// Create a new prefs manager with the given storage backend
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    // ==========================================
    // Session
    // ==========================================

    /// Store the access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::ACCESS_TOKEN, token)
    }

    /// Retrieve the access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Store the refresh token
    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::REFRESH_TOKEN, token)
    }

    /// Retrieve the refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Store session metadata as JSON
    pub fn set_session_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json = serde_json::to_string(meta)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.store.set(StorageKeys::SESSION_META, &json)
    }

    /// Retrieve session metadata
    pub fn get_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.store.get(StorageKeys::SESSION_META)? {
            Some(json) => {
                let meta = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Store a complete session in one call
    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_id: &str,
        email: Option<&str>,
        expires_at: &str,
    ) -> StorageResult<()> {
        self.set_access_token(access_token)?;
        self.set_refresh_token(refresh_token)?;
        self.set_session_meta(&SessionMeta {
            user_id: user_id.to_string(),
            email: email.map(|s| s.to_string()),
            expires_at: expires_at.to_string(),
        })
    }

    /// Check whether both session tokens are present
    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.store.has(StorageKeys::ACCESS_TOKEN)?
            && self.store.has(StorageKeys::REFRESH_TOKEN)?)
    }

    /// Check whether the stored session's access token is expired.
    ///
    /// A missing or unparseable expiry is treated as expired.
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        let meta = match self.get_session_meta()? {
            Some(m) => m,
            None => return Ok(true),
        };

        match chrono::DateTime::parse_from_rfc3339(&meta.expires_at) {
            Ok(expires_at) => Ok(expires_at <= chrono::Utc::now()),
            Err(e) => {
                tracing::warn!(expires_at = %meta.expires_at, error = %e, "Unparseable session expiry");
                Ok(true)
            }
        }
    }

    /// Clear all session data
    pub fn clear_session(&self) -> StorageResult<()> {
        self.store.remove(StorageKeys::ACCESS_TOKEN)?;
        self.store.remove(StorageKeys::REFRESH_TOKEN)?;
        self.store.remove(StorageKeys::SESSION_META)?;
        Ok(())
    }

    // ==========================================
    // Active family
    // ==========================================

    /// Get the per-identity active-family key.
    /// Format: `active_family.<user_id>`
    fn active_family_key(user_id: &str) -> String {
        format!("{}.{}", StorageKeys::ACTIVE_FAMILY_PREFIX, user_id)
    }

    /// Store the active family for an identity
    pub fn set_active_family(&self, user_id: &str, family_id: &str) -> StorageResult<()> {
        self.store.set(&Self::active_family_key(user_id), family_id)
    }

    /// Retrieve the active family for an identity
    pub fn get_active_family(&self, user_id: &str) -> StorageResult<Option<String>> {
        self.store.get(&Self::active_family_key(user_id))
    }

    /// Clear the active family for an identity
    pub fn clear_active_family(&self, user_id: &str) -> StorageResult<()> {
        self.store.remove(&Self::active_family_key(user_id))?;
        Ok(())
    }
}
