//! Tenant and team membership repository.
//!
//! All queries use sqlx macros for compile-time verification.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use miniapp_core::{AccountId, TeamMembership, TenantId, TenantProfile, TenantStatus};

use super::RepositoryError;

#[derive(Debug)]
struct TenantRow {
    id: Uuid,
    owner_account_id: Uuid,
    name: String,
    status: String,
}

impl From<TenantRow> for TenantProfile {
    fn from(row: TenantRow) -> Self {
        Self {
            id: TenantId::new(row.id),
            owner_account_id: AccountId::new(row.owner_account_id),
            name: row.name,
            status: TenantStatus::normalize(&row.status),
        }
    }
}

/// Repository for tenant lookups.
pub struct TenantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TenantRepository<'a> {
    /// Create a new tenant repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a tenant by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: TenantId) -> Result<Option<TenantProfile>, RepositoryError> {
        let row = sqlx::query_as!(
            TenantRow,
            r#"
            SELECT id, owner_account_id, name, status
            FROM miniapp.tenant_profile
            WHERE id = $1
            "#,
            id.as_uuid()
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TenantProfile::from))
    }

    /// Get the tenant owned by an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_owner(
        &self,
        owner: AccountId,
    ) -> Result<Option<TenantProfile>, RepositoryError> {
        let row = sqlx::query_as!(
            TenantRow,
            r#"
            SELECT id, owner_account_id, name, status
            FROM miniapp.tenant_profile
            WHERE owner_account_id = $1
            "#,
            owner.as_uuid()
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TenantProfile::from))
    }

    /// Get an account's oldest team membership.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn first_membership(
        &self,
        account_id: AccountId,
    ) -> Result<Option<TeamMembership>, RepositoryError> {
        let row = sqlx::query!(
            r#"
            SELECT account_id, tenant_id, membership_role,
                   created_at as "created_at: DateTime<Utc>"
            FROM miniapp.team_membership
            WHERE account_id = $1
            ORDER BY created_at ASC, tenant_id ASC
            LIMIT 1
            "#,
            account_id.as_uuid()
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| TeamMembership {
            account_id: AccountId::new(r.account_id),
            tenant_id: TenantId::new(r.tenant_id),
            membership_role: r.membership_role,
            created_at: r.created_at,
        }))
    }
}
