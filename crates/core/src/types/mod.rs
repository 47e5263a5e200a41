//! Core types for the identity layer.
//!
//! This module provides type-safe wrappers for identities, roles and the
//! account records the resolver works with.

pub mod account;
pub mod id;
pub mod principal;
pub mod role;
pub mod stamp;

pub use account::{Account, AccountProfile, TeamMembership, TenantProfile, TenantStatus};
pub use id::*;
pub use principal::ResolvedPrincipal;
pub use role::{Role, RoleParseError, SessionTier};
pub use stamp::RevocationStamp;
