//! Account repository for database operations.
//!
//! All queries use sqlx macros for compile-time verification against the
//! `miniapp` schema.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use miniapp_core::{
    Account, AccountId, AccountProfile, ExternalId, ExternalUser, RevocationStamp, Role,
    UpsertedAccount,
};

use super::RepositoryError;

/// Raw `miniapp.account` row.
#[derive(Debug)]
struct AccountRow {
    id: Uuid,
    external_id: i64,
    role: String,
    revocation_stamp: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    first_name: String,
    last_name: Option<String>,
    username: Option<String>,
    language_code: Option<String>,
    is_premium: bool,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: AccountId::new(row.id),
            external_id: ExternalId::new(row.external_id),
            // Stored roles may predate the canonical names
            role: Role::normalize(&row.role),
            revocation_stamp: row.revocation_stamp.map(RevocationStamp::from),
            deleted_at: row.deleted_at,
            profile: AccountProfile {
                first_name: row.first_name,
                last_name: row.last_name,
                username: row.username,
                language_code: row.language_code,
                is_premium: row.is_premium,
                photo_url: row.photo_url,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for account database operations.
pub struct AccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an account by internal ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as!(
            AccountRow,
            r#"
            SELECT id, external_id, role, revocation_stamp,
                   deleted_at as "deleted_at: DateTime<Utc>",
                   first_name, last_name, username, language_code, is_premium, photo_url,
                   created_at as "created_at: DateTime<Utc>",
                   updated_at as "updated_at: DateTime<Utc>"
            FROM miniapp.account
            WHERE id = $1
            "#,
            id.as_uuid()
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    /// Get an account by chat-platform identity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as!(
            AccountRow,
            r#"
            SELECT id, external_id, role, revocation_stamp,
                   deleted_at as "deleted_at: DateTime<Utc>",
                   first_name, last_name, username, language_code, is_premium, photo_url,
                   created_at as "created_at: DateTime<Utc>",
                   updated_at as "updated_at: DateTime<Utc>"
            FROM miniapp.account
            WHERE external_id = $1
            "#,
            external_id.as_i64()
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    /// Insert a new end-user account or refresh an existing one's profile.
    ///
    /// Runs as a single statement, so concurrent first logins for the same
    /// platform user converge on one row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_from_platform(
        &self,
        user: &ExternalUser,
        new_stamp: &RevocationStamp,
        now: DateTime<Utc>,
    ) -> Result<UpsertedAccount, RepositoryError> {
        let row = sqlx::query!(
            r#"
            INSERT INTO miniapp.account
                (id, external_id, role, revocation_stamp, first_name, last_name,
                 username, language_code, is_premium, photo_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (external_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                language_code = EXCLUDED.language_code,
                is_premium = EXCLUDED.is_premium,
                photo_url = EXCLUDED.photo_url,
                updated_at = EXCLUDED.updated_at
            RETURNING id, external_id, role, revocation_stamp,
                      deleted_at as "deleted_at: DateTime<Utc>",
                      first_name, last_name, username, language_code, is_premium, photo_url,
                      created_at as "created_at: DateTime<Utc>",
                      updated_at as "updated_at: DateTime<Utc>",
                      (xmax = 0) as "created!"
            "#,
            AccountId::generate().as_uuid(),
            user.id.as_i64(),
            Role::EndUser.as_str(),
            new_stamp.as_str(),
            user.first_name.as_str(),
            user.last_name.as_deref(),
            user.username.as_deref(),
            user.language_code.as_deref(),
            user.is_premium,
            user.photo_url.as_deref(),
            now
        )
        .fetch_one(self.pool)
        .await?;

        let account = AccountRow {
            id: row.id,
            external_id: row.external_id,
            role: row.role,
            revocation_stamp: row.revocation_stamp,
            deleted_at: row.deleted_at,
            first_name: row.first_name,
            last_name: row.last_name,
            username: row.username,
            language_code: row.language_code,
            is_premium: row.is_premium,
            photo_url: row.photo_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Ok(UpsertedAccount {
            account: account.into(),
            created: row.created,
        })
    }

    /// Replace an account's revocation stamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn rotate_stamp(
        &self,
        id: AccountId,
        stamp: &RevocationStamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query!(
            r#"
            UPDATE miniapp.account
            SET revocation_stamp = $2, updated_at = now()
            WHERE id = $1
            "#,
            id.as_uuid(),
            stamp.as_str()
        )
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Change an account's role, rotating its stamp in the same write.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_role(
        &self,
        id: AccountId,
        role: Role,
        stamp: &RevocationStamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query!(
            r#"
            UPDATE miniapp.account
            SET role = $2, revocation_stamp = $3, updated_at = now()
            WHERE id = $1
            "#,
            id.as_uuid(),
            role.as_str(),
            stamp.as_str()
        )
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete an account. Already-deleted accounts keep their original
    /// deletion time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn soft_delete(&self, id: AccountId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query!(
            r#"
            UPDATE miniapp.account
            SET deleted_at = COALESCE(deleted_at, $2), updated_at = $2
            WHERE id = $1
            "#,
            id.as_uuid(),
            now
        )
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
