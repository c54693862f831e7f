//! Home routing: landing-screen derivation and redirect issuing.
//!
//! `RouteState::derive` is a pure function from the current flow inputs to a
//! routing state; `HomeRouter` evaluates it on every input change and pushes
//! redirects into an explicit navigation command queue. Re-evaluating an
//! unchanged settled state never re-issues its redirect.

use marinda_backend::{Member, Membership};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// A navigation target issued to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Onboarding entry (create or join a family).
    Onboarding,
    /// Family selection screen.
    FamilySelect,
    /// A member's profile screen.
    MemberProfile { member_id: String },
}

impl Route {
    /// The opaque navigation path for this target.
    pub fn path(&self) -> String {
        match self {
            Route::Onboarding => "/onboarding".to_string(),
            Route::FamilySelect => "/family-select".to_string(),
            Route::MemberProfile { member_id } => format!("/member/{}", member_id),
        }
    }
}

/// Inputs to the routing derivation, borrowed from the flow snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RouteInputs<'a> {
    /// Session store not settled yet.
    pub is_loading: bool,
    /// A valid session exists.
    pub is_logged_in: bool,
    /// Resolved memberships; None while unresolved.
    pub memberships: Option<&'a [Membership]>,
    /// Raw active-family selection (validated against memberships here).
    pub active_family_id: Option<&'a str>,
    /// The identity's own member row in the active family.
    pub own_member: Option<&'a Member>,
    /// The active family's roster, in backend order.
    pub roster: Option<&'a [Member]>,
}

/// Derived routing state.
///
/// Only three states carry a redirect; the rest wait. Upstream fetch
/// failures leave their container unresolved, so they surface here as
/// `Loading`, never as a distinct error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteState {
    /// Something upstream has not settled; wait.
    Loading,
    /// Not logged in; the protected-route layer shows the login entry.
    LoggedOut,
    /// Memberships resolved empty; send to onboarding.
    NeedsOnboarding,
    /// Memberships non-empty but no valid active family; send to selection.
    NeedsFamilySelection,
    /// Active family set, member state not loaded; wait.
    AwaitingMember,
    /// Fully resolved; land on a member profile.
    Routed { member_id: String },
}

impl RouteState {
    /// Derive the routing state from the current inputs.
    pub fn derive(inputs: &RouteInputs) -> RouteState {
        if inputs.is_loading {
            return RouteState::Loading;
        }

        if !inputs.is_logged_in {
            return RouteState::LoggedOut;
        }

        let memberships = match inputs.memberships {
            Some(m) => m,
            None => return RouteState::Loading,
        };

        if memberships.is_empty() {
            return RouteState::NeedsOnboarding;
        }

        // A stored id that no longer names a membership is unset (§ the
        // active-family invariant).
        let active = inputs
            .active_family_id
            .filter(|id| memberships.iter().any(|m| m.family_id == *id));
        if active.is_none() {
            return RouteState::NeedsFamilySelection;
        }

        let (own, roster) = match (inputs.own_member, inputs.roster) {
            (Some(own), Some(roster)) => (own, roster),
            _ => return RouteState::AwaitingMember,
        };

        // Land on the first kid-like profile in roster order, falling back
        // to the identity's own profile.
        let target = roster
            .iter()
            .find(|m| m.role.is_kid_like())
            .map(|m| m.id.clone())
            .unwrap_or_else(|| own.id.clone());

        RouteState::Routed { member_id: target }
    }

    /// The redirect this state carries, if any.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            RouteState::NeedsOnboarding => Some(Route::Onboarding),
            RouteState::NeedsFamilySelection => Some(Route::FamilySelect),
            RouteState::Routed { member_id } => Some(Route::MemberProfile {
                member_id: member_id.clone(),
            }),
            _ => None,
        }
    }
}

/// Evaluates the routing state and issues redirects at most once per settled
/// state through a navigation command queue.
pub struct HomeRouter {
    last_issued: Mutex<Option<Route>>,
    queue: Mutex<VecDeque<Route>>,
}

impl HomeRouter {
    /// Create a router with an empty queue.
    pub fn new() -> Self {
        Self {
            last_issued: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Evaluate the inputs, enqueueing a redirect when the derived target
    /// differs from the last one issued.
    pub fn evaluate(&self, inputs: &RouteInputs) -> RouteState {
        let state = RouteState::derive(inputs);

        if state == RouteState::LoggedOut {
            // Forget the issued target so a later login routes again.
            let mut last = self.last_issued.lock().unwrap();
            *last = None;
            return state;
        }

        if let Some(route) = state.redirect() {
            let mut last = self.last_issued.lock().unwrap();
            if last.as_ref() != Some(&route) {
                debug!(route = %route.path(), "Issuing redirect");
                *last = Some(route.clone());
                self.queue.lock().unwrap().push_back(route);
            }
        }

        state
    }

    /// Drain all pending navigation commands, oldest first.
    pub fn drain(&self) -> Vec<Route> {
        let mut queue = self.queue.lock().unwrap();
        queue.drain(..).collect()
    }

    /// Forget the issued target and drop any queued commands.
    pub fn reset(&self) {
        let mut last = self.last_issued.lock().unwrap();
        *last = None;
        self.queue.lock().unwrap().clear();
    }
}

impl Default for HomeRouter {
    fn default() -> Self {
        Self::new()
    }
}
