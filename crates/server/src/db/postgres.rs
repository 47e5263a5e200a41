//! `PostgreSQL` implementation of [`IdentityStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use miniapp_core::{
    Account, AccountId, ExternalId, ExternalUser, IdentityStore, RevocationStamp, Role,
    StoreError, TeamMembership, TenantId, TenantProfile, UpsertedAccount,
};

use super::{AccountRepository, TenantRepository};

/// Identity store backed by the `miniapp` schema.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    const fn accounts(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.pool)
    }

    const fn tenants(&self) -> TenantRepository<'_> {
        TenantRepository::new(&self.pool)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts().get_by_id(id).await?)
    }

    async fn account_by_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts().get_by_external_id(external_id).await?)
    }

    async fn upsert_platform_account(
        &self,
        user: &ExternalUser,
        new_stamp: RevocationStamp,
        now: DateTime<Utc>,
    ) -> Result<UpsertedAccount, StoreError> {
        Ok(self
            .accounts()
            .upsert_from_platform(user, &new_stamp, now)
            .await?)
    }

    async fn owned_tenant(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TenantProfile>, StoreError> {
        Ok(self.tenants().get_by_owner(account_id).await?)
    }

    async fn tenant(&self, tenant_id: TenantId) -> Result<Option<TenantProfile>, StoreError> {
        Ok(self.tenants().get_by_id(tenant_id).await?)
    }

    async fn first_membership(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        Ok(self.tenants().first_membership(account_id).await?)
    }

    async fn rotate_stamp(
        &self,
        account_id: AccountId,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError> {
        Ok(self.accounts().rotate_stamp(account_id, &stamp).await?)
    }

    async fn set_role(
        &self,
        account_id: AccountId,
        role: Role,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError> {
        Ok(self.accounts().set_role(account_id, role, &stamp).await?)
    }

    async fn soft_delete(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.accounts().soft_delete(account_id, now).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
