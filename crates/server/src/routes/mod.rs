//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (store ping)
//!
//! # Auth
//! POST   /api/auth/login                  - Init data in, session credential out
//! POST   /api/auth/logout                 - Clear session cookies
//! GET    /api/auth/me                     - Current principal (gated)
//!
//! # Tenant (gated, resolved tenant required)
//! GET    /api/tenant/context              - Tenant the request runs against
//!
//! # Admin (gated, staff roles)
//! POST   /api/admin/accounts/{id}/revoke  - Force logout (root-admin, platform-manager)
//! DELETE /api/admin/accounts/{id}         - Soft delete (root-admin)
//! PUT    /api/admin/accounts/{id}/role    - Change role (root-admin)
//! ```

pub mod admin;
pub mod auth;
pub mod health;
pub mod tenant;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use miniapp_core::AccessPolicy;

use crate::middleware::{Gate, gatekeeper, request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Wrap `router` in the gatekeeper with `policy`.
fn gated(state: &AppState, policy: AccessPolicy, router: Router<AppState>) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        Gate::new(state.clone(), policy),
        gatekeeper,
    ))
}

/// Create the auth routes router.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(gated(
            state,
            AccessPolicy::authenticated(),
            Router::new().route("/me", get(auth::me)),
        ))
}

/// Create the tenant routes router.
pub fn tenant_routes(state: &AppState) -> Router<AppState> {
    gated(
        state,
        AccessPolicy::tenant_member(),
        Router::new().route("/context", get(tenant::context)),
    )
}

/// Create the admin routes router.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(gated(
            state,
            AccessPolicy::roles(admin::REVOKE_ROLES),
            Router::new().route("/accounts/{id}/revoke", post(admin::revoke)),
        ))
        .merge(gated(
            state,
            AccessPolicy::roles(admin::ROOT_ROLES),
            Router::new()
                .route("/accounts/{id}", delete(admin::delete))
                .route("/accounts/{id}/role", put(admin::set_role)),
        ))
}

/// Build the complete application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes(&state))
        .nest("/api/tenant", tenant_routes(&state))
        .nest("/api/admin", admin_routes(&state))
        .layer(CookieManagerLayer::new())
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
