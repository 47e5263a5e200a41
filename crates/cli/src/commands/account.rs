//! Account administration commands.
//!
//! Accounts are addressed by their chat-platform identity, since that is
//! the number operators can look up. Every command here invalidates the
//! account's outstanding session credentials.
//!
//! # Usage
//!
//! ```bash
//! miniapp-cli account promote 123456789 root-admin
//! miniapp-cli account revoke 123456789
//! miniapp-cli account delete 123456789
//! ```

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;

use miniapp_core::{Account, ExternalId, IdentityStore, RevocationStamp, Role, StoreError};
use miniapp_server::db::PgIdentityStore;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Missing environment variable: MINIAPP_DATABASE_URL (or DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid role: {0}. Valid roles: root-admin, platform-manager, platform-support, merchant-owner, end-user")]
    InvalidRole(String),

    #[error("No live account for platform user {0}")]
    NotFound(ExternalId),
}

async fn connect() -> Result<PgIdentityStore, AccountError> {
    let database_url = super::database_url().ok_or(AccountError::MissingDatabaseUrl)?;
    tracing::info!("Connecting to database...");
    Ok(PgIdentityStore::new(PgPool::connect(&database_url).await?))
}

async fn live_account(
    store: &PgIdentityStore,
    external_id: ExternalId,
) -> Result<Account, AccountError> {
    store
        .account_by_external_id(external_id)
        .await?
        .filter(|account| !account.is_deleted())
        .ok_or(AccountError::NotFound(external_id))
}

/// Give an account a new role.
///
/// # Errors
///
/// Returns `AccountError::InvalidRole` for anything but a canonical role
/// name, and `AccountError::NotFound` if no live account matches.
pub async fn promote(external_id: ExternalId, role: &str) -> Result<Account, AccountError> {
    let role: Role = role
        .parse()
        .map_err(|_| AccountError::InvalidRole(role.to_owned()))?;

    let store = connect().await?;
    let account = live_account(&store, external_id).await?;
    store
        .set_role(account.id, role, RevocationStamp::generate())
        .await?;

    tracing::info!(
        account_id = %account.id,
        %external_id,
        from = account.role.as_str(),
        to = role.as_str(),
        "Role changed; existing sessions revoked"
    );
    Ok(account)
}

/// Force-logout an account by rotating its stamp.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if no live account matches.
pub async fn revoke(external_id: ExternalId) -> Result<Account, AccountError> {
    let store = connect().await?;
    let account = live_account(&store, external_id).await?;
    store
        .rotate_stamp(account.id, RevocationStamp::generate())
        .await?;

    tracing::info!(account_id = %account.id, %external_id, "Sessions revoked");
    Ok(account)
}

/// Soft-delete an account.
///
/// # Errors
///
/// Returns `AccountError::NotFound` if no live account matches.
pub async fn delete(external_id: ExternalId) -> Result<Account, AccountError> {
    let store = connect().await?;
    let account = live_account(&store, external_id).await?;
    store.soft_delete(account.id, Utc::now()).await?;

    tracing::info!(account_id = %account.id, %external_id, "Account deleted");
    Ok(account)
}
