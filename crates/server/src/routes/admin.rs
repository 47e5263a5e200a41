//! Staff account administration.
//!
//! Every write here rotates (or bypasses) the target's revocation stamp, so
//! the target's outstanding credentials stop working on their next request.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use miniapp_core::{Account, AccountId, Rejection, RevocationStamp, Role};

use crate::error::{ApiResponse, AppError, Result};
use crate::middleware::Principal;
use crate::state::AppState;

/// Roles allowed to force a logout.
pub const REVOKE_ROLES: &[Role] = &[Role::RootAdmin, Role::PlatformManager];

/// Roles allowed to delete accounts and change roles.
pub const ROOT_ROLES: &[Role] = &[Role::RootAdmin];

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountActionResponse {
    pub account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

fn parse_account_id(raw: &str) -> Result<AccountId> {
    AccountId::parse(raw).map_err(|_| AppError::BadRequest(format!("invalid account id: {raw}")))
}

/// Fail with 404 unless the account exists and is not deleted.
async fn require_live(state: &AppState, id: AccountId) -> Result<Account> {
    state
        .identity()
        .load_account(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {id}")))
}

/// `POST /api/admin/accounts/{id}/revoke`
///
/// A manager may not force out an account that outranks them.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the account does not exist and
/// `Rejection::RoleInsufficient` if the target outranks the actor.
pub async fn revoke(
    State(state): State<AppState>,
    Principal(actor): Principal,
    Path(id): Path<String>,
) -> Result<ApiResponse<AccountActionResponse>> {
    let target = parse_account_id(&id)?;
    let account = require_live(&state, target).await?;
    if account.role.outranks(&actor.role) {
        warn!(
            actor = %actor.account_id,
            %target,
            role = account.role.as_str(),
            "revoke refused: target outranks actor"
        );
        return Err(Rejection::RoleInsufficient.into());
    }

    state
        .store()
        .rotate_stamp(target, RevocationStamp::generate())
        .await?;
    info!(actor = %actor.account_id, %target, "sessions revoked");

    Ok(ApiResponse(AccountActionResponse {
        account_id: target,
        role: None,
    }))
}

/// `DELETE /api/admin/accounts/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the account does not exist.
pub async fn delete(
    State(state): State<AppState>,
    Principal(actor): Principal,
    Path(id): Path<String>,
) -> Result<ApiResponse<AccountActionResponse>> {
    let target = parse_account_id(&id)?;
    require_live(&state, target).await?;

    state.store().soft_delete(target, Utc::now()).await?;
    info!(actor = %actor.account_id, %target, "account deleted");

    Ok(ApiResponse(AccountActionResponse {
        account_id: target,
        role: None,
    }))
}

/// `PUT /api/admin/accounts/{id}/role`
///
/// Only canonical role names are accepted here; the lenient normalization
/// applies to stored data, not to administrator input.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for an unknown role or unreadable body and
/// `AppError::NotFound` if the account does not exist.
pub async fn set_role(
    State(state): State<AppState>,
    Principal(actor): Principal,
    Path(id): Path<String>,
    payload: std::result::Result<Json<SetRoleRequest>, JsonRejection>,
) -> Result<ApiResponse<AccountActionResponse>> {
    let target = parse_account_id(&id)?;
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let role = Role::ALL
        .into_iter()
        .find(|r| r.as_str() == body.role)
        .ok_or_else(|| AppError::BadRequest(format!("invalid role: {}", body.role)))?;
    require_live(&state, target).await?;

    state
        .store()
        .set_role(target, role, RevocationStamp::generate())
        .await?;
    info!(
        actor = %actor.account_id,
        %target,
        role = role.as_str(),
        "role changed"
    );

    Ok(ApiResponse(AccountActionResponse {
        account_id: target,
        role: Some(role),
    }))
}
