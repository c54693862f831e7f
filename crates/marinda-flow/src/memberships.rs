//! Generation-counted container for the identity's memberships.

use marinda_backend::Membership;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Holds the resolved memberships for the current identity.
///
/// `None` means unresolved (not yet fetched, or invalidated); an empty vec
/// means the identity belongs to no family. Each fetch is tagged with a
/// monotonic generation; completions from a superseded generation are
/// discarded so a slow response can never overwrite a newer one.
pub struct MembershipResolver {
    generation: AtomicU64,
    state: Mutex<Option<Vec<Membership>>>,
}

impl MembershipResolver {
    /// Create an unresolved resolver.
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            state: Mutex::new(None),
        }
    }

    /// Start a fetch, returning the generation to pass to `complete`.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a fetch result. Returns false (and changes nothing) if a newer
    /// fetch has started since `generation` was issued.
    pub fn complete(&self, generation: u64, memberships: Vec<Membership>) -> bool {
        if generation != self.generation.load(Ordering::SeqCst) {
            debug!(
                generation,
                current = self.generation.load(Ordering::SeqCst),
                "Discarding stale memberships result"
            );
            return false;
        }

        let mut state = self.state.lock().unwrap();
        *state = Some(memberships);
        true
    }

    /// Reset to unresolved and supersede any in-flight fetch.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state = None;
    }

    /// Current resolved memberships, if any.
    pub fn get(&self) -> Option<Vec<Membership>> {
        self.state.lock().unwrap().clone()
    }

    /// Whether a fetch has completed since the last invalidation.
    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }
}

impl Default for MembershipResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(family_id: &str) -> Membership {
        Membership {
            family_id: family_id.to_string(),
            family_name: format!("Family {}", family_id),
            family_code: "CODE".to_string(),
        }
    }

    #[test]
    fn test_starts_unresolved() {
        let resolver = MembershipResolver::new();
        assert!(!resolver.is_resolved());
        assert_eq!(resolver.get(), None);
    }

    #[test]
    fn test_complete_resolves() {
        let resolver = MembershipResolver::new();
        let gen = resolver.begin();

        assert!(resolver.complete(gen, vec![membership("fam-1")]));
        assert!(resolver.is_resolved());
        assert_eq!(resolver.get().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_result_is_resolved() {
        let resolver = MembershipResolver::new();
        let gen = resolver.begin();

        assert!(resolver.complete(gen, vec![]));
        assert!(resolver.is_resolved());
        assert_eq!(resolver.get().unwrap().len(), 0);
    }

    #[test]
    fn test_stale_completion_discarded() {
        let resolver = MembershipResolver::new();

        let slow = resolver.begin();
        let fast = resolver.begin();

        assert!(resolver.complete(fast, vec![membership("fam-new")]));

        // The superseded fetch lands late and must not overwrite
        assert!(!resolver.complete(slow, vec![membership("fam-old")]));
        assert_eq!(resolver.get().unwrap()[0].family_id, "fam-new");
    }

    #[test]
    fn test_invalidate_supersedes_inflight() {
        let resolver = MembershipResolver::new();

        let gen = resolver.begin();
        resolver.invalidate();

        assert!(!resolver.complete(gen, vec![membership("fam-1")]));
        assert!(!resolver.is_resolved());
    }

    #[test]
    fn test_refetch_after_invalidate() {
        let resolver = MembershipResolver::new();

        let gen = resolver.begin();
        resolver.complete(gen, vec![membership("fam-1")]);
        resolver.invalidate();
        assert!(!resolver.is_resolved());

        let gen = resolver.begin();
        resolver.complete(gen, vec![membership("fam-2")]);
        assert_eq!(resolver.get().unwrap()[0].family_id, "fam-2");
    }
}
