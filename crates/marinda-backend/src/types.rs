//! Family-domain records returned by the backend.

use serde::{Deserialize, Serialize};

/// One (identity, family) pairing from the memberships view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Family UUID
    pub family_id: String,
    /// Family display name
    pub family_name: String,
    /// Short join code for the family
    pub family_code: String,
}

/// A member's role within a family.
///
/// Parent roles are `Mom` and `Dad`; everything else (including `Adult`,
/// a grown family member who is not a parent) counts as kid-like for home
/// routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Mom,
    Dad,
    Teen,
    Child,
    Adult,
}

impl Role {
    /// Returns true for the parent roles.
    pub fn is_parent(&self) -> bool {
        matches!(self, Role::Mom | Role::Dad)
    }

    /// Returns true for the roles the home router treats as kid-like.
    pub fn is_kid_like(&self) -> bool {
        !self.is_parent()
    }
}

/// A per-family member record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member UUID
    pub id: String,
    /// Family UUID this member belongs to
    pub family_id: String,
    /// Linked auth identity; None for unclaimed child profiles
    #[serde(default)]
    pub user_id: Option<String>,
    /// Role within the family
    pub role: Role,
    /// Display nickname
    pub nickname: String,
    /// Avatar color
    #[serde(default)]
    pub color: Option<String>,
}

/// Server-checked status of an invite token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    /// Any status this client version does not know; treated as terminal.
    #[serde(other)]
    Unknown,
}

impl InviteStatus {
    /// Returns true only for a still-actionable invite.
    pub fn is_pending(&self) -> bool {
        matches!(self, InviteStatus::Pending)
    }
}

/// Result of accepting an invite.
#[derive(Debug, Clone, Deserialize)]
pub struct AcceptedInvite {
    /// Family the identity just joined
    pub family_id: String,
}
