//! Persisted per-identity active-family selection.

use crate::FlowResult;
use marinda_backend::Membership;
use marinda_storage::PrefsManager;
use std::sync::Mutex;
use tracing::debug;

/// Selects which family is "current" on this device.
///
/// The selection is persisted per identity so it survives process restarts.
/// A stored id that no longer names a current membership is treated as unset
/// at read time (`resolve`); writes of not-yet-listed ids are permitted so a
/// just-joined family can be selected before the memberships refetch lands.
pub struct ActiveFamilySelector {
    prefs: PrefsManager,
    cached: Mutex<Option<String>>,
}

impl ActiveFamilySelector {
    /// Create a selector over the given prefs.
    pub fn new(prefs: PrefsManager) -> Self {
        Self {
            prefs,
            cached: Mutex::new(None),
        }
    }

    /// Load the persisted selection for an identity into the cache.
    /// Called once the identity is known (bootstrap or login).
    pub fn load(&self, user_id: &str) -> FlowResult<()> {
        let stored = self.prefs.get_active_family(user_id)?;
        debug!(user_id = %user_id, active_family = ?stored, "Loaded active-family selection");
        let mut cached = self.cached.lock().unwrap();
        *cached = stored;
        Ok(())
    }

    /// The raw selection, without membership validation.
    pub fn get(&self) -> Option<String> {
        self.cached.lock().unwrap().clone()
    }

    /// The selection validated against the current memberships: a stored id
    /// that is no longer present is unset.
    pub fn resolve(&self, memberships: &[Membership]) -> Option<String> {
        let cached = self.cached.lock().unwrap();
        cached
            .as_ref()
            .filter(|id| memberships.iter().any(|m| &m.family_id == *id))
            .cloned()
    }

    /// Set or clear the selection for an identity, persisting it.
    pub fn set(&self, user_id: &str, family_id: Option<&str>) -> FlowResult<()> {
        match family_id {
            Some(id) => self.prefs.set_active_family(user_id, id)?,
            None => self.prefs.clear_active_family(user_id)?,
        }

        let mut cached = self.cached.lock().unwrap();
        *cached = family_id.map(|s| s.to_string());
        Ok(())
    }

    /// Drop the in-memory selection (sign-out). The persisted value is kept
    /// so the next login by the same identity restores it.
    pub fn reset(&self) {
        let mut cached = self.cached.lock().unwrap();
        *cached = None;
    }
}
