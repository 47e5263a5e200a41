//! Tenant-scoped routes.

use axum::extract::State;
use serde::Serialize;

use miniapp_core::{AccountId, ResolvedPrincipal, TenantId, TenantStatus};

use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::Principal;
use crate::state::AppState;

/// The tenant a request is running against.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub owner_account_id: AccountId,
    pub principal: ResolvedPrincipal,
}

/// `GET /api/tenant/context`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the resolved tenant vanished mid-request.
pub async fn context(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Result<ApiResponse<TenantContext>> {
    let tenant_id = principal
        .tenant_id
        .ok_or_else(|| AppError::NotFound("tenant".to_owned()))?;
    let tenant = state
        .store()
        .tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("tenant".to_owned()))?;

    Ok(ApiResponse(TenantContext {
        tenant_id: tenant.id,
        name: tenant.name,
        status: tenant.status,
        owner_account_id: tenant.owner_account_id,
        principal,
    }))
}
