//! The resolved caller identity handed to business logic.

use serde::{Deserialize, Serialize};

use super::{AccountId, Role, TenantId};

/// Who is calling, and on behalf of which tenant.
///
/// Produced by the identity resolver for every admitted request and consumed
/// by downstream handlers; it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPrincipal {
    pub account_id: AccountId,
    pub role: Role,
    pub is_staff: bool,
    pub tenant_id: Option<TenantId>,
}

impl ResolvedPrincipal {
    /// Build a principal; the staff flag is always derived from the role.
    #[must_use]
    pub const fn new(account_id: AccountId, role: Role, tenant_id: Option<TenantId>) -> Self {
        Self {
            account_id,
            role,
            is_staff: role.is_staff(),
            tenant_id,
        }
    }
}
