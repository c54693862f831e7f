//! Generation-counted container for the active family's member state.

use marinda_backend::Member;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Resolved member state for the active family.
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    /// The identity's own member row; None when the identity has no member
    /// row in the family (e.g. membership created but profile not claimed).
    pub member: Option<Member>,
    /// The family roster, in backend order.
    pub roster: Vec<Member>,
}

/// Holds the member row and roster for the active family.
///
/// `None` means unresolved. Cleared whenever the active family changes or is
/// cleared; generation-counted like the membership resolver so late results
/// for a previous family are discarded.
pub struct MemberResolver {
    generation: AtomicU64,
    state: Mutex<Option<ResolvedMember>>,
}

impl MemberResolver {
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
    pub fn complete(&self, generation: u64, member: Option<Member>, roster: Vec<Member>) -> bool {
        if generation != self.generation.load(Ordering::SeqCst) {
            debug!(
                generation,
                current = self.generation.load(Ordering::SeqCst),
                "Discarding stale member result"
            );
            return false;
        }

        let mut state = self.state.lock().unwrap();
        *state = Some(ResolvedMember { member, roster });
        true
    }

    /// Reset to unresolved and supersede any in-flight fetch.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state = None;
    }

    /// Current resolved state, if any.
    pub fn get(&self) -> Option<ResolvedMember> {
        self.state.lock().unwrap().clone()
    }

    /// Whether a fetch has completed since the last invalidation.
    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }
}

impl Default for MemberResolver {
    fn default() -> Self {
        Self::new()
    }
}
