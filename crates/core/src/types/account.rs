//! Account, tenant and membership records (domain types).
//!
//! These are validated domain objects, separate from database row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, ExternalId, RevocationStamp, Role, TenantId};
use crate::signature::ExternalUser;

/// A platform end-user account.
///
/// `deleted_at` and `revocation_stamp` are independent kill switches: the
/// first disables the account, the second invalidates its sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Internal stable identifier.
    pub id: AccountId,
    /// Chat-platform identity.
    pub external_id: ExternalId,
    /// Normalized platform role.
    pub role: Role,
    /// Current revocation stamp; `None` for legacy rows that never had one.
    pub revocation_stamp: Option<RevocationStamp>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Profile data mirrored from the platform on each login.
    pub profile: AccountProfile,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Display profile copied from the platform's user object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: bool,
    pub photo_url: Option<String>,
}

impl From<&ExternalUser> for AccountProfile {
    fn from(user: &ExternalUser) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            language_code: user.language_code.clone(),
            is_premium: user.is_premium,
            photo_url: user.photo_url.clone(),
        }
    }
}

/// Merchant storefront lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
    Closed,
}

impl TenantStatus {
    /// Lenient parse for stored values; unknown values read as `Suspended`
    /// so a corrupt row never grants an active storefront.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "closed" => Self::Closed,
            _ => Self::Suspended,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Closed => "closed",
        }
    }
}

/// A merchant storefront. Each account owns at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: TenantId,
    pub owner_account_id: AccountId,
    pub name: String,
    pub status: TenantStatus,
}

/// A staff seat on a tenant that is not ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub account_id: AccountId,
    pub tenant_id: TenantId,
    /// Seat role within the tenant (e.g. `agent`).
    pub membership_role: String,
    pub created_at: DateTime<Utc>,
}
