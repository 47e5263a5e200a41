//! In-memory implementation of [`IdentityStore`].
//!
//! Mirrors the constraints of the Postgres schema (unique platform identity,
//! one owned tenant per account) so tests exercise the same semantics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use miniapp_core::{
    Account, AccountId, AccountProfile, ExternalId, ExternalUser, IdentityStore, RevocationStamp,
    Role, StoreError, TeamMembership, TenantId, TenantProfile, TenantStatus, UpsertedAccount,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    tenants: HashMap<TenantId, TenantProfile>,
    memberships: Vec<TeamMembership>,
}

/// Identity store held in process memory.
#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with the given role and a fresh stamp.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the platform identity is taken.
    pub async fn create_account(
        &self,
        external_id: ExternalId,
        role: Role,
    ) -> Result<Account, StoreError> {
        let now = Utc::now();
        let account = Account {
            id: AccountId::generate(),
            external_id,
            role,
            revocation_stamp: Some(RevocationStamp::generate()),
            deleted_at: None,
            profile: AccountProfile::default(),
            created_at: now,
            updated_at: now,
        };
        self.insert_account(account.clone()).await?;
        Ok(account)
    }

    /// Insert a fully specified account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the ID or platform identity is taken.
    pub async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id)
            || tables
                .accounts
                .values()
                .any(|a| a.external_id == account.external_id)
        {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.external_id
            )));
        }
        tables.accounts.insert(account.id, account);
        Ok(())
    }

    /// Create an active tenant owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the owner doesn't exist, or
    /// `StoreError::Conflict` if it already owns a tenant.
    pub async fn create_tenant(
        &self,
        owner: AccountId,
        name: &str,
    ) -> Result<TenantProfile, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&owner) {
            return Err(StoreError::NotFound);
        }
        if tables.tenants.values().any(|t| t.owner_account_id == owner) {
            return Err(StoreError::Conflict(format!(
                "account {owner} already owns a tenant"
            )));
        }
        let tenant = TenantProfile {
            id: TenantId::generate(),
            owner_account_id: owner,
            name: name.to_owned(),
            status: TenantStatus::Active,
        };
        tables.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    /// Give `account_id` a seat on `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if either side doesn't exist, or
    /// `StoreError::Conflict` if the seat already exists.
    pub async fn add_membership(
        &self,
        account_id: AccountId,
        tenant_id: TenantId,
        membership_role: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TeamMembership, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&account_id) || !tables.tenants.contains_key(&tenant_id) {
            return Err(StoreError::NotFound);
        }
        if tables
            .memberships
            .iter()
            .any(|m| m.account_id == account_id && m.tenant_id == tenant_id)
        {
            return Err(StoreError::Conflict("membership already exists".to_owned()));
        }
        let membership = TeamMembership {
            account_id,
            tenant_id,
            membership_role: membership_role.to_owned(),
            created_at,
        };
        tables.memberships.push(membership.clone());
        Ok(membership)
    }

    /// Overwrite an account's stamp, including clearing it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    pub async fn set_stamp(
        &self,
        account_id: AccountId,
        stamp: Option<RevocationStamp>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound)?;
        account.revocation_stamp = stamp;
        Ok(())
    }

    async fn update_account(
        &self,
        account_id: AccountId,
        f: impl FnOnce(&mut Account),
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound)?;
        f(account);
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn account_by_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .accounts
            .values()
            .find(|a| a.external_id == external_id)
            .cloned())
    }

    async fn upsert_platform_account(
        &self,
        user: &ExternalUser,
        new_stamp: RevocationStamp,
        now: DateTime<Utc>,
    ) -> Result<UpsertedAccount, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .accounts
            .values_mut()
            .find(|a| a.external_id == user.id)
        {
            existing.profile = AccountProfile::from(user);
            existing.updated_at = now;
            return Ok(UpsertedAccount {
                account: existing.clone(),
                created: false,
            });
        }

        let account = Account {
            id: AccountId::generate(),
            external_id: user.id,
            role: Role::EndUser,
            revocation_stamp: Some(new_stamp),
            deleted_at: None,
            profile: AccountProfile::from(user),
            created_at: now,
            updated_at: now,
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(UpsertedAccount {
            account,
            created: true,
        })
    }

    async fn owned_tenant(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TenantProfile>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .tenants
            .values()
            .find(|t| t.owner_account_id == account_id)
            .cloned())
    }

    async fn tenant(&self, tenant_id: TenantId) -> Result<Option<TenantProfile>, StoreError> {
        Ok(self.tables.read().await.tenants.get(&tenant_id).cloned())
    }

    async fn first_membership(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.account_id == account_id)
            .min_by_key(|m| (m.created_at, m.tenant_id))
            .cloned())
    }

    async fn rotate_stamp(
        &self,
        account_id: AccountId,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError> {
        self.update_account(account_id, |a| a.revocation_stamp = Some(stamp))
            .await
    }

    async fn set_role(
        &self,
        account_id: AccountId,
        role: Role,
        stamp: RevocationStamp,
    ) -> Result<(), StoreError> {
        self.update_account(account_id, |a| {
            a.role = role;
            a.revocation_stamp = Some(stamp);
        })
        .await
    }

    async fn soft_delete(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.update_account(account_id, |a| {
            a.deleted_at.get_or_insert(now);
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
