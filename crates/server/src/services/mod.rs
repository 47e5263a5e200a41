//! Business logic services for the identity gateway.
//!
//! # Services
//!
//! - `auth` - Login: init-data verification, account upsert, credential issue
//! - `identity` - Effective role and tenant resolution
//! - `rate_limit` - In-process fixed-window counters

pub mod auth;
pub mod identity;
pub mod rate_limit;
