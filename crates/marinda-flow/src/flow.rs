//! The dependency-injected flow aggregate.
//!
//! `FamilyFlow` owns the session store, the resolvers, the active-family
//! selector, the home router and the invite relay, and exposes the imperative
//! operations the navigation shell drives. Lifecycle belongs to the
//! application root: construct once, reset on sign-out.

use crate::active_family::ActiveFamilySelector;
use crate::invite::InviteRelay;
use crate::member::MemberResolver;
use crate::memberships::MembershipResolver;
use crate::router::{HomeRouter, Route, RouteInputs, RouteState};
use crate::{FlowError, FlowResult};
use marinda_auth::SessionManager;
use marinda_backend::{Member, Membership, SupabaseClient};
use marinda_config::{Config, Paths};
use marinda_storage::{KeyValueStore, PrefsManager};
use std::sync::Arc;
use tracing::{info, warn};

/// Reactive state exposed to the navigation shell.
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    /// Session store not settled yet.
    pub is_loading: bool,
    /// A valid session exists.
    pub is_logged_in: bool,
    /// Authenticated identity, if any.
    pub user_id: Option<String>,
    /// Resolved memberships; None while unresolved.
    pub memberships: Option<Vec<Membership>>,
    /// Raw active-family selection.
    pub active_family_id: Option<String>,
    /// Own member row in the active family, once resolved.
    pub member: Option<Member>,
    /// Active family roster, once resolved.
    pub roster: Option<Vec<Member>>,
    /// Pending invite token, if a deep link carried one.
    pub pending_invite_token: Option<String>,
}

/// Aggregate owning the login/membership/routing flow.
pub struct FamilyFlow {
    session: Arc<SessionManager>,
    client: SupabaseClient,
    memberships: Arc<MembershipResolver>,
    members: Arc<MemberResolver>,
    active_family: ActiveFamilySelector,
    router: HomeRouter,
    invites: InviteRelay,
}

impl FamilyFlow {
    /// Create the flow over an existing session manager and backend client.
    ///
    /// `prefs` must share the backing store with the session manager so the
    /// active-family selection and the session live in the same device store.
    pub fn new(session: Arc<SessionManager>, client: SupabaseClient, prefs: PrefsManager) -> Self {
        let memberships = Arc::new(MembershipResolver::new());
        let members = Arc::new(MemberResolver::new());

        // Session loss invalidates everything derived from it. Transient
        // states (refreshing) must not wipe resolved data mid-flight.
        {
            let memberships = Arc::clone(&memberships);
            let members = Arc::clone(&members);
            session.set_state_callback(Box::new(move |payload| {
                if payload.state == marinda_auth::AuthState::NotLoggedIn {
                    memberships.invalidate();
                    members.invalidate();
                }
            }));
        }

        Self {
            session,
            client,
            memberships,
            members,
            active_family: ActiveFamilySelector::new(prefs),
            router: HomeRouter::new(),
            invites: InviteRelay::new(),
        }
    }

    /// Build the full flow from configuration: one shared device store, a
    /// session manager and a backend client.
    pub fn from_config(config: &Config, paths: &Paths) -> FlowResult<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::from(marinda_storage::create_store(paths)?);
        let session_prefs = PrefsManager::new(Box::new(Arc::clone(&store)));
        let flow_prefs = PrefsManager::new(Box::new(store));

        let session = Arc::new(SessionManager::new(
            session_prefs,
            &config.supabase_url,
            &config.supabase_publishable_key,
        ));
        let client = SupabaseClient::new(
            config.supabase_url.clone(),
            config.supabase_publishable_key.clone(),
        );

        Ok(Self::new(session, client, flow_prefs))
    }

    /// Restore the session and resolve the initial state on app start.
    ///
    /// A failed restore is logged and leaves the flow logged out; it is never
    /// surfaced as an error to the shell.
    pub async fn bootstrap(&self) -> RouteState {
        if let Err(e) = self.session.validate_session_on_startup().await {
            warn!(error = %e, "Session restore failed, continuing logged out");
        }

        if self.session.is_logged_in().unwrap_or(false) {
            if let Ok(Some(user_id)) = self.session.user_id() {
                if let Err(e) = self.active_family.load(&user_id) {
                    warn!(error = %e, "Could not load active-family selection");
                }
            }

            self.refresh_memberships().await;
            self.resolve_member().await;
        }

        self.evaluate_route()
    }

    /// Refetch the memberships for the current identity.
    ///
    /// Fetch failures are logged and leave the container unresolved; the
    /// router keeps reporting `Loading`.
    pub async fn refresh_memberships(&self) {
        let generation = self.memberships.begin();

        let (access_token, user_id) = match self.session.get_valid_token().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Cannot refresh memberships without a session");
                return;
            }
        };

        match self.client.list_memberships(&user_id, &access_token).await {
            Ok(list) => {
                self.memberships.complete(generation, list);
            }
            Err(e) => warn!(error = %e, "Membership fetch failed, staying unresolved"),
        }
    }

    /// Refetch the member row and roster for the active family.
    ///
    /// With no active family the member state is simply cleared.
    pub async fn resolve_member(&self) {
        let family_id = match self.active_family.get() {
            Some(id) => id,
            None => {
                self.members.invalidate();
                return;
            }
        };

        let generation = self.members.begin();

        let (access_token, user_id) = match self.session.get_valid_token().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Cannot resolve member without a session");
                return;
            }
        };

        let member = self
            .client
            .fetch_member(&family_id, &user_id, &access_token)
            .await;
        let roster = self
            .client
            .list_family_members(&family_id, &access_token)
            .await;

        match (member, roster) {
            (Ok(member), Ok(roster)) => {
                self.members.complete(generation, member, roster);
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Member fetch failed, staying unresolved");
            }
        }
    }

    /// Select (or clear) the active family, persist it, and re-resolve
    /// member state.
    pub async fn set_active_family(&self, family_id: Option<&str>) -> FlowResult<RouteState> {
        let user_id = self.session.user_id()?.ok_or(FlowError::NotLoggedIn)?;

        self.active_family.set(&user_id, family_id)?;
        self.members.invalidate();

        if family_id.is_some() {
            self.resolve_member().await;
        }

        Ok(self.evaluate_route())
    }

    /// Process an invite deep link.
    ///
    /// Runs once per distinct token once the session store has settled;
    /// unrelated re-invocations with the same token are no-ops. The token is
    /// kept only when the server reports it pending.
    pub async fn handle_invite_link(&self, token: Option<&str>) {
        if self.session.auth_state().is_loading() {
            // Not settled: the shell replays the link after bootstrap.
            return;
        }

        if !self.invites.needs_sync(token) {
            return;
        }

        match token {
            None => self.invites.clear(),
            Some(t) => {
                let bearer = match self.session.get_valid_token().await {
                    Ok((access, _)) => access,
                    // Status checks work pre-login with the anonymous bearer.
                    Err(_) => self.client.anon_bearer().to_string(),
                };

                let status = self.client.invite_status(t, &bearer).await.ok();
                self.invites.apply_status(t, status);
            }
        }

        self.invites.mark_synced(token);
    }

    /// Accept the pending invite: join its family, refresh memberships and
    /// make the joined family active.
    ///
    /// On failure the pending token is kept so the screen can retry.
    pub async fn accept_invite(&self) -> FlowResult<String> {
        let token = self.invites.pending().ok_or(FlowError::NoPendingInvite)?;
        let (access_token, _) = self.session.get_valid_token().await?;

        let accepted = self.client.accept_invite(&token, &access_token).await?;

        self.invites.clear();
        self.refresh_memberships().await;
        self.set_active_family(Some(&accepted.family_id)).await?;

        info!(family_id = %accepted.family_id, "Joined family via invite");
        Ok(accepted.family_id)
    }

    /// Reject the pending invite.
    ///
    /// On failure the pending token is kept so the screen can retry.
    pub async fn reject_invite(&self) -> FlowResult<()> {
        let token = self.invites.pending().ok_or(FlowError::NoPendingInvite)?;
        let (access_token, _) = self.session.get_valid_token().await?;

        self.client.reject_invite(&token, &access_token).await?;

        self.invites.clear();
        self.refresh_memberships().await;
        self.evaluate_route();
        Ok(())
    }

    /// Sign out and reset every container to its initial value.
    pub async fn sign_out(&self) -> FlowResult<()> {
        self.session.sign_out().await?;

        self.memberships.invalidate();
        self.members.invalidate();
        self.active_family.reset();
        self.invites.reset();
        self.router.reset();

        self.evaluate_route();
        Ok(())
    }

    /// The pending invite token, if any.
    pub fn pending_invite_token(&self) -> Option<String> {
        self.invites.pending()
    }

    /// Override the pending invite token directly.
    pub fn set_pending_invite_token(&self, token: Option<&str>) {
        self.invites.set_pending(token);
    }

    /// Current reactive state for the shell.
    pub fn snapshot(&self) -> FlowSnapshot {
        let resolved_member = self.members.get();
        let (member, roster) = match resolved_member {
            Some(r) => (r.member, Some(r.roster)),
            None => (None, None),
        };

        FlowSnapshot {
            is_loading: self.session.auth_state().is_loading(),
            is_logged_in: self.session.is_logged_in().unwrap_or(false),
            user_id: self.session.user_id().ok().flatten(),
            memberships: self.memberships.get(),
            active_family_id: self.active_family.get(),
            member,
            roster,
            pending_invite_token: self.invites.pending(),
        }
    }

    /// Evaluate the routing state, enqueueing a redirect when the settled
    /// state changed.
    pub fn evaluate_route(&self) -> RouteState {
        let snapshot = self.snapshot();

        let inputs = RouteInputs {
            is_loading: snapshot.is_loading,
            is_logged_in: snapshot.is_logged_in,
            memberships: snapshot.memberships.as_deref(),
            active_family_id: snapshot.active_family_id.as_deref(),
            own_member: snapshot.member.as_ref(),
            roster: snapshot.roster.as_deref(),
        };

        self.router.evaluate(&inputs)
    }

    /// Drain pending navigation commands, oldest first.
    pub fn drain_navigation(&self) -> Vec<Route> {
        self.router.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marinda_backend::Role;
    use marinda_storage::{KeyValueStore, StorageResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStore {
        data: Mutex<HashMap<String, String>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
            }
        }
    }

    impl KeyValueStore for MemoryStore {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn remove(&self, key: &str) -> StorageResult<bool> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }

    fn membership(family_id: &str) -> Membership {
        Membership {
            family_id: family_id.to_string(),
            family_name: "Family".to_string(),
            family_code: "CODE".to_string(),
        }
    }

    fn member(id: &str, role: Role) -> Member {
        Member {
            id: id.to_string(),
            family_id: "fam-1".to_string(),
            user_id: Some("user-1".to_string()),
            role,
            nickname: id.to_string(),
            color: None,
        }
    }

    /// Flow with a shared store so tests can inject session state directly.
    fn create_flow() -> (FamilyFlow, PrefsManager) {
        let store = Arc::new(MemoryStore::new());

        let session_prefs = PrefsManager::new(Box::new(Arc::clone(&store)));
        let flow_prefs = PrefsManager::new(Box::new(Arc::clone(&store)));
        let injector = PrefsManager::new(Box::new(store));

        let session = Arc::new(SessionManager::new(
            session_prefs,
            "https://test.supabase.co",
            "test-publishable-key",
        ));
        let client = SupabaseClient::new("https://test.supabase.co", "test-publishable-key");

        (FamilyFlow::new(session, client, flow_prefs), injector)
    }

    fn inject_session(injector: &PrefsManager, user_id: &str) {
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        injector
            .set_session("access", "refresh", user_id, None, &expires_at)
            .unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_without_session_is_logged_out() {
        let (flow, _injector) = create_flow();

        let state = flow.bootstrap().await;
        assert_eq!(state, RouteState::LoggedOut);
        assert!(flow.drain_navigation().is_empty());

        let snapshot = flow.snapshot();
        assert!(!snapshot.is_logged_in);
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.memberships, None);
    }

    #[test]
    fn test_logged_in_with_unresolved_memberships_waits() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        assert_eq!(flow.evaluate_route(), RouteState::Loading);
        assert!(flow.drain_navigation().is_empty());
    }

    #[test]
    fn test_empty_memberships_route_to_onboarding() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![]);

        assert_eq!(flow.evaluate_route(), RouteState::NeedsOnboarding);
        assert_eq!(flow.drain_navigation(), vec![Route::Onboarding]);

        // Re-evaluating the unchanged state issues nothing further
        flow.evaluate_route();
        assert!(flow.drain_navigation().is_empty());
    }

    #[test]
    fn test_memberships_without_selection_route_to_family_select() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        let generation = flow.memberships.begin();
        flow.memberships
            .complete(generation, vec![membership("fam-1"), membership("fam-2")]);

        assert_eq!(flow.evaluate_route(), RouteState::NeedsFamilySelection);
        assert_eq!(flow.drain_navigation(), vec![Route::FamilySelect]);
    }

    #[test]
    fn test_full_resolution_routes_to_member_profile() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![membership("fam-1")]);
        flow.active_family.set("user-1", Some("fam-1")).unwrap();

        let generation = flow.members.begin();
        let own = member("mem-a", Role::Mom);
        flow.members.complete(
            generation,
            Some(own.clone()),
            vec![own, member("mem-b", Role::Child)],
        );

        assert_eq!(
            flow.evaluate_route(),
            RouteState::Routed {
                member_id: "mem-b".to_string()
            }
        );
        assert_eq!(
            flow.drain_navigation(),
            vec![Route::MemberProfile {
                member_id: "mem-b".to_string()
            }]
        );
    }

    #[test]
    fn test_shrunken_memberships_self_heal_selection() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        flow.active_family.set("user-1", Some("fam-x")).unwrap();

        // Refresh lands without fam-x
        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![membership("fam-1")]);

        assert_eq!(flow.evaluate_route(), RouteState::NeedsFamilySelection);
    }

    #[test]
    fn test_active_family_without_member_state_waits() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![membership("fam-1")]);
        flow.active_family.set("user-1", Some("fam-1")).unwrap();

        assert_eq!(flow.evaluate_route(), RouteState::AwaitingMember);
        assert!(flow.drain_navigation().is_empty());
    }

    #[tokio::test]
    async fn test_set_active_family_requires_login() {
        let (flow, _injector) = create_flow();

        let result = flow.set_active_family(Some("fam-1")).await;
        assert!(matches!(result, Err(FlowError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_accept_invite_without_pending_token() {
        let (flow, _injector) = create_flow();

        let result = flow.accept_invite().await;
        assert!(matches!(result, Err(FlowError::NoPendingInvite)));
    }

    #[tokio::test]
    async fn test_reject_invite_without_pending_token() {
        let (flow, _injector) = create_flow();

        let result = flow.reject_invite().await;
        assert!(matches!(result, Err(FlowError::NoPendingInvite)));
    }

    #[tokio::test]
    async fn test_invite_link_without_token_clears_pending() {
        let (flow, _injector) = create_flow();

        flow.set_pending_invite_token(Some("stale"));
        flow.handle_invite_link(None).await;

        assert_eq!(flow.pending_invite_token(), None);
    }

    #[test]
    fn test_from_config_builds_logged_out_flow() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::default();

        let flow = FamilyFlow::from_config(&config, &paths).unwrap();

        let snapshot = flow.snapshot();
        assert!(!snapshot.is_logged_in);
        assert_eq!(snapshot.memberships, None);
        assert_eq!(snapshot.active_family_id, None);
    }

    #[test]
    fn test_snapshot_exposes_pending_invite() {
        let (flow, _injector) = create_flow();

        flow.set_pending_invite_token(Some("tok-1"));
        assert_eq!(
            flow.snapshot().pending_invite_token,
            Some("tok-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_sign_out_resets_containers() {
        let (flow, injector) = create_flow();
        inject_session(&injector, "user-1");

        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![membership("fam-1")]);
        flow.active_family.set("user-1", Some("fam-1")).unwrap();
        flow.set_pending_invite_token(Some("tok"));
        flow.evaluate_route();

        // Remove tokens first so sign-out skips the best-effort server call
        injector.clear_session().unwrap();

        flow.sign_out().await.unwrap();

        let snapshot = flow.snapshot();
        assert!(!snapshot.is_logged_in);
        assert_eq!(snapshot.memberships, None);
        assert_eq!(snapshot.active_family_id, None);
        assert_eq!(snapshot.member, None);
        assert_eq!(snapshot.pending_invite_token, None);
        assert!(flow.drain_navigation().is_empty());
    }

    #[tokio::test]
    async fn test_session_loss_invalidates_resolvers() {
        let (flow, _injector) = create_flow();

        let generation = flow.memberships.begin();
        flow.memberships.complete(generation, vec![membership("fam-1")]);
        assert!(flow.memberships.is_resolved());

        // With no stored session, startup validation lands on NotLoggedIn
        // and fires the state callback wired in FamilyFlow::new, which must
        // wipe session-derived state.
        let restored = flow.session.validate_session_on_startup().await.unwrap();
        assert!(!restored);

        assert!(!flow.memberships.is_resolved());
        assert!(!flow.members.is_resolved());
    }
}
