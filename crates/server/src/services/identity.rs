//! Identity resolution: account record to effective principal.

use miniapp_core::{
    Account, AccountId, IdentityStore, ResolvedPrincipal, StoreError, TenantBinding,
    TenantBindings, TenantId, resolve_tenant,
};
use tracing::{debug, instrument};

/// Outcome of resolving an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The account is live and bound as described.
    Resolved {
        principal: ResolvedPrincipal,
        binding: TenantBinding,
    },
    /// The account does not exist or has been soft-deleted.
    NotFound,
    /// The caller may not act on the requested tenant.
    TenantForbidden,
}

/// Computes the effective role and tenant for an account.
pub struct IdentityResolver<'a> {
    store: &'a dyn IdentityStore,
}

impl<'a> IdentityResolver<'a> {
    /// Create a resolver over `store`.
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore) -> Self {
        Self { store }
    }

    /// Load a live account; soft-deleted accounts read as absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store fails.
    pub async fn load_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.store.account(id).await?.filter(|a| !a.is_deleted()))
    }

    /// Resolve an account by ID.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store fails.
    pub async fn resolve(
        &self,
        account_id: AccountId,
        requested: Option<TenantId>,
    ) -> Result<Resolution, StoreError> {
        match self.load_account(account_id).await? {
            Some(account) => self.resolve_for(&account, requested).await,
            None => Ok(Resolution::NotFound),
        }
    }

    /// Resolve an already-loaded account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store fails.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn resolve_for(
        &self,
        account: &Account,
        requested: Option<TenantId>,
    ) -> Result<Resolution, StoreError> {
        if account.is_deleted() {
            return Ok(Resolution::NotFound);
        }

        let is_staff = account.role.is_staff();
        // Staff naming a tenant never fall back to their own relationships
        let bindings = if is_staff && requested.is_some() {
            TenantBindings::default()
        } else {
            self.store.tenant_bindings(account.id).await?
        };

        let binding = match resolve_tenant(is_staff, requested, &bindings) {
            Ok(binding) => binding,
            Err(_) => {
                debug!("requested tenant is outside the caller's clearance");
                return Ok(Resolution::TenantForbidden);
            }
        };

        if let TenantBinding::Requested(tenant_id) = binding
            && self.store.tenant(tenant_id).await?.is_none()
        {
            debug!(%tenant_id, "staff requested a tenant that does not exist");
            return Ok(Resolution::TenantForbidden);
        }

        debug!(source = binding.source(), "tenant resolved");
        Ok(Resolution::Resolved {
            principal: ResolvedPrincipal::new(account.id, account.role, binding.tenant_id()),
            binding,
        })
    }
}
