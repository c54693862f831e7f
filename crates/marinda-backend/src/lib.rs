//! Supabase REST and Edge Function client for the Marinda family domain.
//!
//! This crate provides:
//! - Typed family-domain records (memberships, members, roles, invites)
//! - A REST client for the memberships view and member rows
//! - Edge Function calls for invite status, accept and reject
//!
//! All business logic (invite validation, membership writes, role
//! assignment) executes server-side; this crate only speaks the
//! request/response contracts.

mod client;
mod error;
mod types;

pub use client::SupabaseClient;
pub use error::{BackendError, BackendResult};
pub use types::{AcceptedInvite, InviteStatus, Member, Membership, Role};
