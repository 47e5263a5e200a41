//! Storage seams.
//!
//! The protocol components never talk to a database directly. The server
//! crate provides a Postgres-backed [`IdentityStore`] for production and an
//! in-memory one for tests; rate limiting goes through [`CounterStore`] so a
//! shared backend can replace the in-process default.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::signature::ExternalUser;
use crate::tenancy::TenantBindings;
use crate::types::{
    Account, AccountId, ExternalId, RevocationStamp, Role, TeamMembership, TenantId,
    TenantProfile,
};

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or the query failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned into a domain value.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A write conflicted with an existing row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The target row does not exist.
    #[error("not found")]
    NotFound,
}

/// Result of a login upsert.
#[derive(Debug, Clone)]
pub struct UpsertedAccount {
    pub account: Account,
    /// `true` when this login created the account.
    pub created: bool,
}

/// Account, tenant and membership persistence.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load an account by internal ID, including soft-deleted ones.
    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Load an account by platform identity, including soft-deleted ones.
    async fn account_by_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<Account>, StoreError>;

    /// Find or create the account for a verified platform user.
    ///
    /// New accounts are created as end users carrying `new_stamp`. Existing
    /// accounts have their profile refreshed; role, stamp and deletion state
    /// are left untouched.
    async fn upsert_platform_account(
        &self,
        user: &ExternalUser,
        new_stamp: RevocationStamp,
        now: DateTime<Utc>,
    ) -> Result<UpsertedAccount, StoreError>;

    /// The tenant owned by `account_id`, if any.
    async fn owned_tenant(&self, account_id: AccountId)
    -> Result<Option<TenantProfile>, StoreError>;

    /// Load a tenant by ID.
    async fn tenant(&self, tenant_id: TenantId) -> Result<Option<TenantProfile>, StoreError>;

    /// The account's oldest team membership (ties broken by tenant ID).
    async fn first_membership(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TeamMembership>, StoreError>;

    /// Replace the account's revocation stamp.
    async fn rotate_stamp(
        &self,
        account_id: AccountId,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError>;

    /// Change the account's role and rotate its stamp in one write.
    async fn set_role(
        &self,
        account_id: AccountId,
        role: Role,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError>;

    /// Mark the account deleted. Idempotent; the first deletion time is kept.
    async fn soft_delete(&self, account_id: AccountId, now: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Readiness check against the backing store.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Owned tenant and first membership, loaded together.
    async fn tenant_bindings(&self, account_id: AccountId) -> Result<TenantBindings, StoreError> {
        let owned = self.owned_tenant(account_id).await?.map(|t| t.id);
        let first_membership = self
            .first_membership(account_id)
            .await?
            .map(|m| m.tenant_id);
        Ok(TenantBindings {
            owned,
            first_membership,
        })
    }
}

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Hits in the current window, including this one.
    pub count: u64,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

/// Fixed-window hit counter used for rate limiting.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one hit for `key` in a window of length `window`.
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError>;
}
