//! Route gatekeeper: the single authentication perimeter.
//!
//! Every gated request walks the same sequence:
//!
//! ```text
//! UNAUTHENTICATED → CREDENTIAL_PRESENT → SIGNATURE_VALID → NOT_EXPIRED
//!     → NOT_REVOKED → ROLE_AUTHORIZED → FORWARDED
//! ```
//!
//! The first failing step rejects the request with a machine-readable code.
//! On success the resolved principal is attached to the request extensions,
//! and the session cookie is re-issued when its recorded policy no longer
//! matches the current network context.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tower_cookies::Cookies;
use tracing::{debug, info, warn};

use miniapp_core::{
    AccessPolicy, CredentialFault, IdentityStore, Rejection, ResolvedPrincipal, SessionClaims,
    SessionCodec, StoreError, revocation,
};

use super::context::{CookieNames, CredentialSource, RequestContext};
use super::{cookies, rate_limit};
use crate::error::{AppError, set_sentry_user};
use crate::services::identity::{IdentityResolver, Resolution};
use crate::state::AppState;

/// The check a rejected request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    CredentialPresent,
    SignatureValid,
    NotExpired,
    NotRevoked,
    RoleAuthorized,
}

impl GateStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CredentialPresent => "credential_present",
            Self::SignatureValid => "signature_valid",
            Self::NotExpired => "not_expired",
            Self::NotRevoked => "not_revoked",
            Self::RoleAuthorized => "role_authorized",
        }
    }
}

/// A request that passed every check.
#[derive(Debug, Clone)]
pub struct Admission {
    pub principal: ResolvedPrincipal,
    pub claims: SessionClaims,
    pub source: CredentialSource,
}

/// Outcome of running the gate.
#[derive(Debug, Clone)]
pub enum GateDecision {
    Forward(Box<Admission>),
    Reject {
        stage: GateStage,
        rejection: Rejection,
    },
}

impl GateDecision {
    const fn reject(stage: GateStage, rejection: Rejection) -> Self {
        Self::Reject { stage, rejection }
    }
}

/// Runs the gate checks against a [`RequestContext`].
pub struct RouteGatekeeper<'a> {
    codec: &'a SessionCodec,
    store: &'a dyn IdentityStore,
}

impl<'a> RouteGatekeeper<'a> {
    #[must_use]
    pub const fn new(codec: &'a SessionCodec, store: &'a dyn IdentityStore) -> Self {
        Self { codec, store }
    }

    /// Decide whether the request described by `ctx` may proceed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only when the identity store fails; every
    /// expected refusal is a [`GateDecision::Reject`].
    pub async fn admit(
        &self,
        ctx: &RequestContext,
        policy: &AccessPolicy,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, StoreError> {
        let Some((source, token)) = ctx.credential() else {
            return Ok(GateDecision::reject(
                GateStage::CredentialPresent,
                Rejection::CredentialMissing,
            ));
        };

        let claims = match self.codec.verify(token, now) {
            Ok(claims) => claims,
            Err(fault) => {
                let stage = match fault {
                    CredentialFault::Expired => GateStage::NotExpired,
                    CredentialFault::BadSignature | CredentialFault::Malformed => {
                        GateStage::SignatureValid
                    }
                };
                return Ok(GateDecision::reject(stage, fault.into()));
            }
        };

        let resolver = IdentityResolver::new(self.store);
        let Some(account) = resolver.load_account(claims.sub).await? else {
            return Ok(GateDecision::reject(
                GateStage::NotRevoked,
                Rejection::CredentialRevoked,
            ));
        };
        if revocation::check(&claims, &account).is_revoked() {
            return Ok(GateDecision::reject(
                GateStage::NotRevoked,
                Rejection::CredentialRevoked,
            ));
        }

        let requested = match ctx.requested_tenant_id() {
            Ok(requested) => requested,
            Err(rejection) => return Ok(GateDecision::reject(GateStage::RoleAuthorized, rejection)),
        };

        let principal = match resolver.resolve_for(&account, requested).await? {
            Resolution::Resolved { principal, .. } => principal,
            Resolution::TenantForbidden => {
                return Ok(GateDecision::reject(
                    GateStage::RoleAuthorized,
                    Rejection::RoleInsufficient,
                ));
            }
            Resolution::NotFound => {
                return Ok(GateDecision::reject(
                    GateStage::NotRevoked,
                    Rejection::CredentialRevoked,
                ));
            }
        };

        if let Err(rejection) = policy.authorize(&principal) {
            return Ok(GateDecision::reject(GateStage::RoleAuthorized, rejection));
        }

        Ok(GateDecision::Forward(Box::new(Admission {
            principal,
            claims,
            source,
        })))
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Middleware state: the app plus the policy of the routes it guards.
#[derive(Clone)]
pub struct Gate {
    pub state: AppState,
    pub policy: AccessPolicy,
}

impl Gate {
    #[must_use]
    pub const fn new(state: AppState, policy: AccessPolicy) -> Self {
        Self { state, policy }
    }
}

/// Gatekeeper middleware, installed with `axum::middleware::from_fn_with_state`.
///
/// # Errors
///
/// Returns `AppError::Rejected` for refused requests, `AppError::RateLimited`
/// once the caller's API window is exhausted, and `AppError::Store` if the
/// identity store fails.
pub async fn gatekeeper(
    State(gate): State<Gate>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let state = &gate.state;
    let config = state.config();
    let marker_name = config.session.marker_cookie_name();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let ctx = RequestContext::from_request(
        request.headers(),
        request.uri(),
        CookieNames {
            session: &config.session.cookie_name,
            marker: &marker_name,
        },
        peer,
    );

    let now = Utc::now();
    let decision = RouteGatekeeper::new(state.codec(), state.store())
        .admit(&ctx, &gate.policy, now)
        .await?;

    let admission = match decision {
        GateDecision::Forward(admission) => admission,
        GateDecision::Reject { stage, rejection } => {
            if rejection == Rejection::CredentialMissing {
                debug!(stage = stage.as_str(), code = rejection.code(), "request rejected");
            } else {
                warn!(
                    stage = stage.as_str(),
                    code = rejection.code(),
                    path = request.uri().path(),
                    "request rejected"
                );
            }
            return Err(rejection.into());
        }
    };

    let account_id = admission.principal.account_id;
    rate_limit::enforce(
        state.counters(),
        &format!("api:{account_id}"),
        config.rate_limits.api,
    )
    .await?;

    if admission.source == CredentialSource::Cookie {
        let policy = ctx.cookie_policy();
        let marker = policy.marker();
        if ctx.policy_marker.as_deref() != Some(marker.as_str())
            && let (Some((_, token)), Some(expires_at)) =
                (ctx.credential(), admission.claims.expires_at())
        {
            info!(%account_id, marker = %marker, "re-issuing session cookie for new network context");
            cookies::write_session(&cookies, &config.session, token, expires_at, &policy, now);
        }
    }

    set_sentry_user(&account_id);
    request.extensions_mut().insert(*admission);

    Ok(next.run(request).await)
}

// =============================================================================
// Extractors
// =============================================================================

/// Extractor for the principal attached by [`gatekeeper`].
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Principal(principal): Principal) -> impl IntoResponse {
///     ApiResponse(principal)
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Principal(pub ResolvedPrincipal);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Admission>()
            .map(|admission| Self(admission.principal))
            .ok_or(AppError::Rejected(Rejection::CredentialMissing))
    }
}

/// Extractor for the full admission, including the verified claims.
#[derive(Debug, Clone)]
pub struct Admitted(pub Admission);

impl<S> FromRequestParts<S> for Admitted
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Admission>()
            .cloned()
            .map(Self)
            .ok_or(AppError::Rejected(Rejection::CredentialMissing))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use miniapp_core::{
        AccountId, ExternalId, RevocationStamp, Role, SessionSubject, SessionTtl, TenantId,
    };
    use secrecy::SecretString;

    use super::*;
    use crate::db::MemoryIdentityStore;

    const SECRET: &str = "k7Qm2vX9pL4sR8tW1yZ6bN3cF5hJ0dGa";

    fn codec() -> SessionCodec {
        SessionCodec::new(&SecretString::from(SECRET), SessionTtl::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    fn issue(codec: &SessionCodec, account: &miniapp_core::Account, at: DateTime<Utc>) -> String {
        codec
            .issue(
                &SessionSubject {
                    account_id: account.id,
                    tenant_id: None,
                    role: account.role,
                    stamp: account.revocation_stamp.clone(),
                },
                at,
            )
            .unwrap()
            .token
    }

    fn bearer(token: String) -> RequestContext {
        RequestContext {
            bearer_credential: Some(token),
            ..RequestContext::default()
        }
    }

    fn rejected(decision: &GateDecision) -> (GateStage, Rejection) {
        match decision {
            GateDecision::Reject { stage, rejection } => (*stage, *rejection),
            GateDecision::Forward(admission) => panic!("expected rejection, got {admission:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let decision = RouteGatekeeper::new(&codec, &store)
            .admit(&RequestContext::default(), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(
            rejected(&decision),
            (GateStage::CredentialPresent, Rejection::CredentialMissing)
        );
    }

    #[tokio::test]
    async fn test_garbage_credential() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let decision = RouteGatekeeper::new(&codec, &store)
            .admit(&bearer("garbage".to_owned()), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(
            rejected(&decision),
            (GateStage::SignatureValid, Rejection::CredentialMalformedOrExpired)
        );
    }

    #[tokio::test]
    async fn test_expired_credential() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let account = store.create_account(ExternalId::new(1), Role::EndUser).await.unwrap();
        let token = issue(&codec, &account, now() - Duration::days(31));

        let decision = RouteGatekeeper::new(&codec, &store)
            .admit(&bearer(token), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(
            rejected(&decision),
            (GateStage::NotExpired, Rejection::CredentialMalformedOrExpired)
        );
    }

    #[tokio::test]
    async fn test_rotation_revokes_then_fresh_credential_passes() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let account = store.create_account(ExternalId::new(2), Role::EndUser).await.unwrap();
        let old_token = issue(&codec, &account, now());

        store
            .rotate_stamp(account.id, RevocationStamp::generate())
            .await
            .unwrap();
        let gate = RouteGatekeeper::new(&codec, &store);
        let decision = gate
            .admit(&bearer(old_token), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(
            rejected(&decision),
            (GateStage::NotRevoked, Rejection::CredentialRevoked)
        );

        let rotated = store.account(account.id).await.unwrap().unwrap();
        let fresh = issue(&codec, &rotated, now());
        let decision = gate
            .admit(&bearer(fresh), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Forward(_)));
    }

    #[tokio::test]
    async fn test_unknown_or_deleted_account_is_revoked() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let ghost = miniapp_core::Account {
            id: AccountId::generate(),
            ..store.create_account(ExternalId::new(3), Role::EndUser).await.unwrap()
        };
        let gate = RouteGatekeeper::new(&codec, &store);
        let decision = gate
            .admit(&bearer(issue(&codec, &ghost, now())), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(rejected(&decision).1, Rejection::CredentialRevoked);

        let account = store.create_account(ExternalId::new(4), Role::EndUser).await.unwrap();
        let token = issue(&codec, &account, now());
        store.soft_delete(account.id, now()).await.unwrap();
        let decision = gate
            .admit(&bearer(token), &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(rejected(&decision).1, Rejection::CredentialRevoked);
    }

    #[tokio::test]
    async fn test_malformed_tenant_and_role_checks() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let account = store.create_account(ExternalId::new(5), Role::EndUser).await.unwrap();
        let token = issue(&codec, &account, now());
        let gate = RouteGatekeeper::new(&codec, &store);

        let mut ctx = bearer(token);
        ctx.requested_tenant = Some("nope".to_owned());
        let decision = gate
            .admit(&ctx, &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(rejected(&decision).1, Rejection::TenantIdMalformed);

        ctx.requested_tenant = None;
        let decision = gate.admit(&ctx, &AccessPolicy::staff(), now()).await.unwrap();
        assert_eq!(
            rejected(&decision),
            (GateStage::RoleAuthorized, Rejection::RoleInsufficient)
        );

        ctx.requested_tenant = Some(TenantId::generate().to_string());
        let decision = gate
            .admit(&ctx, &AccessPolicy::authenticated(), now())
            .await
            .unwrap();
        assert_eq!(rejected(&decision).1, Rejection::RoleInsufficient);
    }

    #[tokio::test]
    async fn test_role_comes_from_account_not_claims() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let account = store
            .create_account(ExternalId::new(6), Role::PlatformManager)
            .await
            .unwrap();
        let token = issue(&codec, &account, now());
        // Demotion keeping the same stamp still takes effect immediately
        store
            .set_role(
                account.id,
                Role::EndUser,
                account.revocation_stamp.clone().unwrap(),
            )
            .await
            .unwrap();

        let decision = RouteGatekeeper::new(&codec, &store)
            .admit(&bearer(token), &AccessPolicy::staff(), now())
            .await
            .unwrap();
        assert_eq!(rejected(&decision).1, Rejection::RoleInsufficient);
    }

    #[tokio::test]
    async fn test_admission_carries_principal() {
        let store = MemoryIdentityStore::new();
        let codec = codec();
        let owner = store
            .create_account(ExternalId::new(7), Role::MerchantOwner)
            .await
            .unwrap();
        let tenant = store.create_tenant(owner.id, "Shop").await.unwrap();
        let ctx = RequestContext {
            cookie_credential: Some(issue(&codec, &owner, now())),
            ..RequestContext::default()
        };

        let decision = RouteGatekeeper::new(&codec, &store)
            .admit(&ctx, &AccessPolicy::tenant_member(), now())
            .await
            .unwrap();
        let GateDecision::Forward(admission) = decision else {
            panic!("expected forward");
        };
        assert_eq!(admission.source, CredentialSource::Cookie);
        assert_eq!(admission.principal.account_id, owner.id);
        assert_eq!(admission.principal.tenant_id, Some(tenant.id));
    }
}
