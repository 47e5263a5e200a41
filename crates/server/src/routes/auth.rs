//! Login, logout and session introspection.

use std::net::SocketAddr;

use axum::{
    body::{Bytes, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_cookies::Cookies;

use miniapp_core::{RawFields, Rejection, ResolvedPrincipal};

use crate::error::{ApiResponse, AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::cookies::{clear_session, write_session};
use crate::middleware::rate_limit::{enforce, login_key};
use crate::middleware::{Admitted, CookieNames, RequestContext};
use crate::services::auth::LoginService;
use crate::state::AppState;

/// Largest accepted login body. Init data is well under 4 KiB in practice.
const MAX_LOGIN_BODY: usize = 16 * 1024;

/// Init data as sent by the client: the raw query string, or the fields
/// already unpacked into an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InitData {
    Query(String),
    Object(Map<String, Value>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    init_data: InitData,
}

/// Successful login payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Also usable as an `Authorization: Bearer` credential.
    pub token: String,
    pub principal: ResolvedPrincipal,
    pub expires_at: DateTime<Utc>,
    pub created: bool,
}

/// Current session payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub principal: ResolvedPrincipal,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub logged_out: bool,
}

fn request_context(state: &AppState, request: &Request) -> RequestContext {
    let session = &state.config().session;
    let marker = session.marker_cookie_name();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    RequestContext::from_request(
        request.headers(),
        request.uri(),
        CookieNames {
            session: &session.cookie_name,
            marker: &marker,
        },
        peer,
    )
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
}

/// Decode the login body into raw init-data fields.
///
/// JSON bodies carry `initData` as a query string or an object; anything
/// else is read as a URL-encoded form of the fields themselves.
fn parse_fields(json: bool, body: &Bytes) -> std::result::Result<RawFields, Rejection> {
    if json {
        let body: LoginBody =
            serde_json::from_slice(body).map_err(|_| Rejection::PayloadMalformed)?;
        return Ok(match body.init_data {
            InitData::Query(raw) => RawFields::from_query(&raw),
            InitData::Object(object) => RawFields::from_json(&object),
        });
    }

    std::str::from_utf8(body)
        .map(RawFields::from_query)
        .map_err(|_| Rejection::PayloadMalformed)
}

/// `POST /api/auth/login`
///
/// # Errors
///
/// - `AppError::RateLimited` when the client address exhausted its window
/// - `AppError::Rejected` with the verification or clearance failure
/// - `AppError::BadRequest` if the body cannot be read
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
) -> Result<ApiResponse<LoginResponse>> {
    let ctx = request_context(&state, &request);
    enforce(
        state.counters(),
        &login_key(ctx.client_ip),
        state.config().rate_limits.login,
    )
    .await?;

    let json = is_json(request.headers());
    let body = to_bytes(request.into_body(), MAX_LOGIN_BODY)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable login body: {e}")))?;
    let fields = parse_fields(json, &body)?;
    let requested = ctx.requested_tenant_id()?;

    let now = Utc::now();
    let outcome = LoginService::new(state.store(), state.verifier(), state.codec())
        .login(&fields, requested, now)
        .await?;

    let expires_at = outcome
        .credential
        .claims
        .expires_at()
        .ok_or_else(|| AppError::Internal("issued credential has no expiry".to_owned()))?;

    write_session(
        &cookies,
        &state.config().session,
        &outcome.credential.token,
        expires_at,
        &ctx.cookie_policy(),
        now,
    );
    set_sentry_user(&outcome.principal.account_id);

    Ok(ApiResponse(LoginResponse {
        token: outcome.credential.token,
        principal: outcome.principal,
        expires_at,
        created: outcome.created,
    }))
}

/// `POST /api/auth/logout`
///
/// Clears the session cookie and its marker. The credential itself stays
/// valid until expiry; use account revocation to end it server-side.
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
) -> ApiResponse<LogoutResponse> {
    let ctx = request_context(&state, &request);
    clear_session(&cookies, &state.config().session, &ctx.cookie_policy());
    clear_sentry_user();
    ApiResponse(LogoutResponse { logged_out: true })
}

/// `GET /api/auth/me`
pub async fn me(Admitted(admission): Admitted) -> ApiResponse<SessionResponse> {
    ApiResponse(SessionResponse {
        principal: admission.principal,
        expires_at: admission.claims.expires_at(),
    })
}
