//! Account roles and their normalization.
//!
//! Role values arrive from several sources (database rows written by older
//! tooling, CLI input, credentials) with inconsistent casing and separators.
//! Every RBAC decision compares against the canonical [`Role`] enum, so raw
//! strings are funnelled through [`Role::normalize`] exactly once, at the
//! edge where they are read.

use serde::{Deserialize, Serialize};

/// Error returned by the strict [`Role`] parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct RoleParseError(String);

/// Platform role, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Unrestricted platform operator.
    RootAdmin,
    /// Staff member managing merchants and accounts.
    PlatformManager,
    /// Staff member with read-mostly oversight for support work.
    PlatformSupport,
    /// Owner of a merchant storefront.
    MerchantOwner,
    /// Regular chat-platform user.
    EndUser,
}

/// Session lifetime tier derived from a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTier {
    /// Staff sessions are short-lived.
    Staff,
    /// Merchant and end-user sessions are long-lived.
    Member,
}

impl Role {
    /// All roles, in descending order of privilege.
    pub const ALL: [Self; 5] = [
        Self::RootAdmin,
        Self::PlatformManager,
        Self::PlatformSupport,
        Self::MerchantOwner,
        Self::EndUser,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RootAdmin => "root-admin",
            Self::PlatformManager => "platform-manager",
            Self::PlatformSupport => "platform-support",
            Self::MerchantOwner => "merchant-owner",
            Self::EndUser => "end-user",
        }
    }

    /// Whether this role carries cross-tenant oversight clearance.
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(
            self,
            Self::RootAdmin | Self::PlatformManager | Self::PlatformSupport
        )
    }

    /// Position in [`Role::ALL`]; lower is more privileged.
    const fn rank(self) -> u8 {
        match self {
            Self::RootAdmin => 0,
            Self::PlatformManager => 1,
            Self::PlatformSupport => 2,
            Self::MerchantOwner => 3,
            Self::EndUser => 4,
        }
    }

    /// Whether this role is strictly more privileged than `other`.
    #[must_use]
    pub const fn outranks(&self, other: &Self) -> bool {
        self.rank() < other.rank()
    }

    /// Session lifetime tier for credentials issued to this role.
    #[must_use]
    pub const fn tier(&self) -> SessionTier {
        if self.is_staff() {
            SessionTier::Staff
        } else {
            SessionTier::Member
        }
    }

    /// Lenient parse used when reading stored or upstream role values.
    ///
    /// Case, surrounding whitespace and the separator style (`_`, `-`, space)
    /// are ignored, and the legacy spellings found in older rows are mapped
    /// onto the canonical set. Anything unrecognised degrades to
    /// [`Role::EndUser`], the role with the least clearance.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        Self::lookup(raw).unwrap_or_else(|| {
            tracing::warn!(role = raw, "unrecognised role value, treating as end-user");
            Self::EndUser
        })
    }

    fn lookup(raw: &str) -> Option<Self> {
        let canonical: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match canonical.as_str() {
            "root-admin" | "rootadmin" | "superadmin" | "super-admin" | "root" => {
                Some(Self::RootAdmin)
            }
            "platform-manager" | "manager" | "admin" => Some(Self::PlatformManager),
            "platform-support" | "support" => Some(Self::PlatformSupport),
            "merchant-owner" | "merchant" | "owner" | "seller" => Some(Self::MerchantOwner),
            "end-user" | "enduser" | "user" | "customer" => Some(Self::EndUser),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: accepts the same spellings as [`Role::normalize`] but
/// rejects unknown values instead of degrading them.
impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| RoleParseError(s.to_owned()))
    }
}
