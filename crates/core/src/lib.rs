//! Mini App Core - identity and session protocol primitives.
//!
//! This crate holds everything the perimeter needs to decide who a caller is,
//! without touching the network or a database. It is shared by:
//! - `server` - The HTTP API (gatekeeper middleware, login, admin routes)
//! - `cli` - Migrations and account administration
//!
//! # Architecture
//!
//! The core crate contains only types, pure functions and store traits. Every
//! component here is a deterministic function of its inputs (the current time
//! is always passed in explicitly), so the protocol can be exercised in unit
//! tests without a running server.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, roles, revocation stamps and account records
//! - [`signature`] - Platform init-data signature verification
//! - [`session`] - Signed session credential issuance and verification
//! - [`revocation`] - Force-logout detection via revocation stamps
//! - [`cookie`] - Cookie attribute selection per network context
//! - [`tenancy`] - Tenant binding precedence rules
//! - [`access`] - Role/tenant clearance checks
//! - [`rejection`] - Machine-readable rejection codes
//! - [`store`] - Storage traits implemented by the server crate

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod access;
pub mod cookie;
pub mod rejection;
pub mod revocation;
pub mod session;
pub mod signature;
pub mod store;
pub mod tenancy;
pub mod types;

pub use access::AccessPolicy;
pub use cookie::{CookiePolicy, SameSitePolicy, select_policy};
pub use rejection::{Rejection, RejectionClass};
pub use revocation::RevocationStatus;
pub use session::{
    CodecError, CredentialFault, IssuedCredential, SessionClaims, SessionCodec, SessionSubject,
    SessionTtl,
};
pub use signature::{ExternalUser, RawFields, SignatureVerifier, VerifiedPayload};
pub use store::{CounterSnapshot, CounterStore, IdentityStore, StoreError, UpsertedAccount};
pub use tenancy::{TenantBinding, TenantBindings, resolve_tenant};
pub use types::*;
