//! Identity persistence.
//!
//! # Schema: `miniapp`
//!
//! ## Tables
//!
//! - `account` - Platform accounts keyed by chat-platform identity
//! - `tenant_profile` - Merchant storefronts (one per owning account)
//! - `team_membership` - Staff seats on tenants
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p miniapp-cli -- migrate
//! ```
//!
//! Repository queries are checked at compile time. Build with `DATABASE_URL`
//! pointing at a migrated database, or with `SQLX_OFFLINE=true` after
//! `cargo sqlx prepare --workspace` has written `.sqlx/`.
//!
//! # Backends
//!
//! [`PgIdentityStore`] serves production traffic; [`MemoryIdentityStore`]
//! implements the same trait for tests and local experiments.

pub mod accounts;
pub mod memory;
pub mod postgres;
pub mod tenants;

use std::time::Duration;

use miniapp_core::StoreError;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use accounts::AccountRepository;
pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;
pub use tenants::TenantRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate tenant owner).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => Self::Unavailable(e.to_string()),
            RepositoryError::DataCorruption(msg) => Self::DataCorruption(msg),
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
