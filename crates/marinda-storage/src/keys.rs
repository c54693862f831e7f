//! Storage key constants.

/// Storage keys used by the client core
pub struct StorageKeys;

impl StorageKeys {
    /// Supabase access token
    pub const ACCESS_TOKEN: &'static str = "supabase_access_token";

    /// Supabase refresh token
    pub const REFRESH_TOKEN: &'static str = "supabase_refresh_token";

    /// Session metadata (JSON)
    pub const SESSION_META: &'static str = "supabase_session_meta";

    /// Prefix for the per-identity active-family selection.
    /// Full key: `active_family.<user_id>`
    pub const ACTIVE_FAMILY_PREFIX: &'static str = "active_family";
}
