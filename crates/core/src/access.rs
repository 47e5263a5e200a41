//! Route clearance checks applied after a principal is resolved.

use crate::rejection::Rejection;
use crate::types::{ResolvedPrincipal, Role};

/// What a route demands of its caller beyond being authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    roles: Option<&'static [Role]>,
    staff_only: bool,
    requires_tenant: bool,
}

impl AccessPolicy {
    /// Any authenticated caller.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            roles: None,
            staff_only: false,
            requires_tenant: false,
        }
    }

    /// Only callers holding one of `roles`.
    #[must_use]
    pub const fn roles(roles: &'static [Role]) -> Self {
        Self {
            roles: Some(roles),
            staff_only: false,
            requires_tenant: false,
        }
    }

    /// Only staff.
    #[must_use]
    pub const fn staff() -> Self {
        Self {
            roles: None,
            staff_only: true,
            requires_tenant: false,
        }
    }

    /// Any caller that resolved to a tenant.
    #[must_use]
    pub const fn tenant_member() -> Self {
        Self {
            roles: None,
            staff_only: false,
            requires_tenant: true,
        }
    }

    /// Check `principal` against this policy.
    ///
    /// # Errors
    ///
    /// Returns `Rejection::RoleInsufficient` if any requirement is unmet.
    pub fn authorize(&self, principal: &ResolvedPrincipal) -> Result<(), Rejection> {
        let role_ok = self
            .roles
            .is_none_or(|allowed| allowed.contains(&principal.role));
        let staff_ok = !self.staff_only || principal.is_staff;
        let tenant_ok = !self.requires_tenant || principal.tenant_id.is_some();

        if role_ok && staff_ok && tenant_ok {
            Ok(())
        } else {
            Err(Rejection::RoleInsufficient)
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::authenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, TenantId};

    fn principal(role: Role, tenant: bool) -> ResolvedPrincipal {
        ResolvedPrincipal::new(
            AccountId::generate(),
            role,
            tenant.then(TenantId::generate),
        )
    }

    #[test]
    fn test_authenticated_admits_everyone() {
        for role in Role::ALL {
            assert!(AccessPolicy::authenticated()
                .authorize(&principal(role, false))
                .is_ok());
        }
    }

    #[test]
    fn test_role_list() {
        const ADMINS: &[Role] = &[Role::RootAdmin, Role::PlatformManager];
        let policy = AccessPolicy::roles(ADMINS);
        assert!(policy.authorize(&principal(Role::RootAdmin, false)).is_ok());
        assert!(policy.authorize(&principal(Role::PlatformManager, false)).is_ok());
        assert_eq!(
            policy.authorize(&principal(Role::PlatformSupport, false)),
            Err(Rejection::RoleInsufficient)
        );
        assert_eq!(
            policy.authorize(&principal(Role::MerchantOwner, true)),
            Err(Rejection::RoleInsufficient)
        );
    }

    #[test]
    fn test_staff_only() {
        let policy = AccessPolicy::staff();
        assert!(policy.authorize(&principal(Role::PlatformSupport, false)).is_ok());
        assert_eq!(
            policy.authorize(&principal(Role::EndUser, true)),
            Err(Rejection::RoleInsufficient)
        );
    }

    #[test]
    fn test_tenant_member_requires_tenant() {
        let policy = AccessPolicy::tenant_member();
        assert!(policy.authorize(&principal(Role::EndUser, true)).is_ok());
        assert_eq!(
            policy.authorize(&principal(Role::RootAdmin, false)),
            Err(Rejection::RoleInsufficient)
        );
    }
}
