//! Login, membership and home-routing flow for the Marinda client core.
//!
//! This crate wires the session store, the family backend and device-local
//! storage into the state the navigation shell consumes:
//! - `MembershipResolver` / `MemberResolver`: generation-counted containers
//!   for session-derived backend state
//! - `ActiveFamilySelector`: persisted per-identity family selection with a
//!   self-healing read against the resolved memberships
//! - `HomeRouter`: an explicit state machine deriving the landing screen and
//!   issuing redirects through a navigation command queue
//! - `InviteRelay`: deep-link invite token capture and consumption
//! - `FamilyFlow`: the dependency-injected aggregate owning all of the above

mod active_family;
mod error;
mod flow;
mod invite;
mod member;
mod memberships;
mod router;

pub use active_family::ActiveFamilySelector;
pub use error::{FlowError, FlowResult};
pub use flow::{FamilyFlow, FlowSnapshot};
pub use invite::InviteRelay;
pub use member::{MemberResolver, ResolvedMember};
pub use memberships::MembershipResolver;
pub use router::{HomeRouter, Route, RouteInputs, RouteState};
