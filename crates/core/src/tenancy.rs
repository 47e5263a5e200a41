//! Tenant binding precedence.
//!
//! An account can relate to tenants three ways: by being staff (oversight of
//! any tenant on request), by owning one, or by holding a team seat on one.
//! The first applicable relationship decides the tenant a request runs
//! against:
//!
//! 1. a tenant named in the request, if the caller is staff
//! 2. the tenant the caller owns
//! 3. the caller's first team membership
//! 4. no tenant
//!
//! Staff oversight is never redirected to the staff member's own tenant, and
//! ownership is never overridden by a membership.

use crate::rejection::Rejection;
use crate::types::TenantId;

/// The caller's standing tenant relationships, as loaded from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantBindings {
    /// The tenant the account owns, if any.
    pub owned: Option<TenantId>,
    /// The tenant of the account's first team membership, if any.
    pub first_membership: Option<TenantId>,
}

impl TenantBindings {
    /// The binding the account resolves to when it names no tenant.
    #[must_use]
    pub const fn natural(&self) -> TenantBinding {
        match (self.owned, self.first_membership) {
            (Some(owned), _) => TenantBinding::Owned(owned),
            (None, Some(membership)) => TenantBinding::Membership(membership),
            (None, None) => TenantBinding::Unbound,
        }
    }
}

/// Which relationship a resolved tenant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantBinding {
    /// Staff oversight of the tenant named in the request.
    Requested(TenantId),
    /// The caller's own tenant.
    Owned(TenantId),
    /// The caller's first team seat.
    Membership(TenantId),
    /// No tenant applies.
    Unbound,
}

impl TenantBinding {
    /// The bound tenant, if any.
    #[must_use]
    pub const fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Requested(id) | Self::Owned(id) | Self::Membership(id) => Some(*id),
            Self::Unbound => None,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::Requested(_) => "requested",
            Self::Owned(_) => "owned",
            Self::Membership(_) => "membership",
            Self::Unbound => "unbound",
        }
    }
}

/// Decide which tenant a request runs against.
///
/// A non-staff caller may name a tenant only if it is the one it would
/// resolve to anyway; naming any other is refused with `RoleInsufficient`.
/// For staff, the caller is responsible for confirming that a
/// [`TenantBinding::Requested`] tenant exists.
///
/// # Errors
///
/// Returns `Rejection::RoleInsufficient` when a non-staff caller names a
/// foreign tenant.
pub fn resolve_tenant(
    is_staff: bool,
    requested: Option<TenantId>,
    bindings: &TenantBindings,
) -> Result<TenantBinding, Rejection> {
    if is_staff && let Some(requested) = requested {
        return Ok(TenantBinding::Requested(requested));
    }

    let natural = bindings.natural();

    match requested {
        Some(requested) if natural.tenant_id() != Some(requested) => {
            Err(Rejection::RoleInsufficient)
        }
        _ => Ok(natural),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids() -> (TenantId, TenantId, TenantId) {
        (
            TenantId::generate(),
            TenantId::generate(),
            TenantId::generate(),
        )
    }

    #[test]
    fn test_staff_request_overrides_own_tenant() {
        let (own, seat, other) = ids();
        let bindings = TenantBindings {
            owned: Some(own),
            first_membership: Some(seat),
        };
        assert_eq!(
            resolve_tenant(true, Some(other), &bindings).unwrap(),
            TenantBinding::Requested(other)
        );
    }

    #[test]
    fn test_owner_beats_membership() {
        let (own, seat, _) = ids();
        let bindings = TenantBindings {
            owned: Some(own),
            first_membership: Some(seat),
        };
        assert_eq!(
            resolve_tenant(false, None, &bindings).unwrap(),
            TenantBinding::Owned(own)
        );
        assert_eq!(bindings.natural(), TenantBinding::Owned(own));
    }

    #[test]
    fn test_membership_when_nothing_owned() {
        let (_, seat, _) = ids();
        let bindings = TenantBindings {
            owned: None,
            first_membership: Some(seat),
        };
        assert_eq!(
            resolve_tenant(false, None, &bindings).unwrap(),
            TenantBinding::Membership(seat)
        );
    }

    #[test]
    fn test_unbound_without_relationships() {
        let binding = resolve_tenant(false, None, &TenantBindings::default()).unwrap();
        assert_eq!(binding, TenantBinding::Unbound);
        assert_eq!(binding.tenant_id(), None);
    }

    #[test]
    fn test_staff_without_request_falls_through() {
        let (own, _, _) = ids();
        let bindings = TenantBindings {
            owned: Some(own),
            first_membership: None,
        };
        assert_eq!(
            resolve_tenant(true, None, &bindings).unwrap(),
            TenantBinding::Owned(own)
        );
        assert_eq!(
            resolve_tenant(true, None, &TenantBindings::default()).unwrap(),
            TenantBinding::Unbound
        );
    }

    #[test]
    fn test_non_staff_foreign_tenant_refused() {
        let (own, seat, other) = ids();
        let bindings = TenantBindings {
            owned: Some(own),
            first_membership: Some(seat),
        };
        assert_eq!(
            resolve_tenant(false, Some(other), &bindings),
            Err(Rejection::RoleInsufficient)
        );
        // A membership tenant is not reachable while an owned tenant exists
        assert_eq!(
            resolve_tenant(false, Some(seat), &bindings),
            Err(Rejection::RoleInsufficient)
        );
        assert_eq!(
            resolve_tenant(false, Some(other), &TenantBindings::default()),
            Err(Rejection::RoleInsufficient)
        );
    }

    #[test]
    fn test_non_staff_naming_own_tenant_is_allowed() {
        let (own, _, _) = ids();
        let bindings = TenantBindings {
            owned: Some(own),
            first_membership: None,
        };
        assert_eq!(
            resolve_tenant(false, Some(own), &bindings).unwrap(),
            TenantBinding::Owned(own)
        );
    }
}
