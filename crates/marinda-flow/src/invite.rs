//! Deep-link invite token relay.

use marinda_backend::InviteStatus;
use std::sync::Mutex;
use tracing::debug;

/// Holds a deep-linked invite token until it is consumed.
///
/// A token is stored only when its server-checked status is pending; any
/// terminal status, a fetch error, or an absent token clears it. The relay
/// remembers the last token parameter it synced so the check runs once per
/// distinct token, not on every re-evaluation.
pub struct InviteRelay {
    pending: Mutex<Option<String>>,
    last_synced: Mutex<Option<Option<String>>>,
}

impl InviteRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            last_synced: Mutex::new(None),
        }
    }

    /// The pending invite token, if any.
    pub fn pending(&self) -> Option<String> {
        self.pending.lock().unwrap().clone()
    }

    /// Whether the given link token still needs a status check.
    pub fn needs_sync(&self, token: Option<&str>) -> bool {
        let last = self.last_synced.lock().unwrap();
        last.as_ref() != Some(&token.map(|s| s.to_string()))
    }

    /// Record that the given link token has been checked.
    pub fn mark_synced(&self, token: Option<&str>) {
        let mut last = self.last_synced.lock().unwrap();
        *last = Some(token.map(|s| s.to_string()));
    }

    /// Apply a checked status for a token: pending stores it, anything else
    /// (including a failed check, passed as None) clears it.
    pub fn apply_status(&self, token: &str, status: Option<InviteStatus>) {
        let mut pending = self.pending.lock().unwrap();
        match status {
            Some(s) if s.is_pending() => {
                debug!("Invite token stored as pending");
                *pending = Some(token.to_string());
            }
            _ => {
                debug!(status = ?status, "Invite token not pending, clearing");
                *pending = None;
            }
        }
    }

    /// Set the pending token directly (shell-driven override).
    pub fn set_pending(&self, token: Option<&str>) {
        let mut pending = self.pending.lock().unwrap();
        *pending = token.map(|s| s.to_string());
    }

    /// Clear the pending token (terminal action taken).
    pub fn clear(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending = None;
    }

    /// Forget everything, including the sync memory (sign-out).
    pub fn reset(&self) {
        self.clear();
        let mut last = self.last_synced.lock().unwrap();
        *last = None;
    }
}

impl Default for InviteRelay {
    fn default() -> Self {
        Self::new()
    }
}
