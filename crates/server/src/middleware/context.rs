//! Per-request inputs to the gatekeeper, read once from the raw request.

use std::net::IpAddr;

use axum::http::{
    HeaderMap, Uri,
    header::{AUTHORIZATION, COOKIE, HOST},
};
use tower_cookies::Cookie;

use miniapp_core::{CookiePolicy, Rejection, TenantId, select_policy};

use super::rate_limit::client_ip;

/// Header through which a caller names the tenant it wants to act on.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Query parameter fallback for [`TENANT_HEADER`].
pub const TENANT_QUERY_PARAM: &str = "tenantId";

const FORWARDED_HOST: &str = "x-forwarded-host";
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Where the presented credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cookie,
    Bearer,
}

/// Cookie names the context reads.
#[derive(Debug, Clone, Copy)]
pub struct CookieNames<'a> {
    pub session: &'a str,
    pub marker: &'a str,
}

/// Everything the gatekeeper needs from a request, as plain values.
#[derive(Clone, Default)]
pub struct RequestContext {
    /// Effective host (`X-Forwarded-Host` over `Host`).
    pub host: Option<String>,
    /// Effective scheme (`X-Forwarded-Proto` over the URI scheme).
    pub proto: Option<String>,
    pub cookie_credential: Option<String>,
    pub bearer_credential: Option<String>,
    /// Policy marker the session cookie was last written with.
    pub policy_marker: Option<String>,
    /// Raw tenant identifier as sent, not yet validated.
    pub requested_tenant: Option<String>,
    pub client_ip: Option<IpAddr>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("host", &self.host)
            .field("proto", &self.proto)
            .field("cookie_credential", &self.cookie_credential.as_ref().map(|_| "[REDACTED]"))
            .field("bearer_credential", &self.bearer_credential.as_ref().map(|_| "[REDACTED]"))
            .field("policy_marker", &self.policy_marker)
            .field("requested_tenant", &self.requested_tenant)
            .field("client_ip", &self.client_ip)
            .finish()
    }
}

impl RequestContext {
    /// Read the context from request headers and URI.
    ///
    /// `peer` is the socket address, used only when no proxy header carries
    /// the client address.
    #[must_use]
    pub fn from_request(
        headers: &HeaderMap,
        uri: &Uri,
        names: CookieNames<'_>,
        peer: Option<IpAddr>,
    ) -> Self {
        let (cookie_credential, policy_marker) = read_cookies(headers, names);

        Self {
            host: effective_host(headers, uri),
            proto: effective_proto(headers, uri),
            cookie_credential,
            bearer_credential: bearer_token(headers),
            policy_marker,
            requested_tenant: requested_tenant(headers, uri),
            client_ip: client_ip(headers, peer),
        }
    }

    /// Cookie policy for this request's network context.
    #[must_use]
    pub fn cookie_policy(&self) -> CookiePolicy {
        select_policy(self.host.as_deref(), self.proto.as_deref())
    }

    /// The credential to check: the cookie when present, else the bearer.
    #[must_use]
    pub fn credential(&self) -> Option<(CredentialSource, &str)> {
        self.cookie_credential
            .as_deref()
            .map(|token| (CredentialSource::Cookie, token))
            .or_else(|| {
                self.bearer_credential
                    .as_deref()
                    .map(|token| (CredentialSource::Bearer, token))
            })
    }

    /// Parse the requested tenant, if one was named.
    ///
    /// # Errors
    ///
    /// Returns `Rejection::TenantIdMalformed` if the value is not a UUID.
    pub fn requested_tenant_id(&self) -> Result<Option<TenantId>, Rejection> {
        self.requested_tenant
            .as_deref()
            .map(|raw| TenantId::parse(raw).map_err(|_| Rejection::TenantIdMalformed))
            .transpose()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Effective host for cookie decisions.
#[must_use]
pub fn effective_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    header_str(headers, FORWARDED_HOST)
        .or_else(|| header_str(headers, HOST.as_str()))
        .map(str::to_owned)
        .or_else(|| uri.host().map(str::to_owned))
}

/// Effective scheme for cookie decisions.
#[must_use]
pub fn effective_proto(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    header_str(headers, FORWARDED_PROTO)
        .map(str::to_owned)
        .or_else(|| uri.scheme_str().map(str::to_owned))
}

fn read_cookies(headers: &HeaderMap, names: CookieNames<'_>) -> (Option<String>, Option<String>) {
    let mut session = None;
    let mut marker = None;

    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw).filter_map(Result::ok) {
            let value = cookie.value();
            if value.is_empty() {
                continue;
            }
            // First occurrence wins, matching browser ordering by path length
            if cookie.name() == names.session && session.is_none() {
                session = Some(value.to_owned());
            } else if cookie.name() == names.marker && marker.is_none() {
                marker = Some(value.to_owned());
            }
        }
    }

    (session, marker)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

fn requested_tenant(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    header_str(headers, TENANT_HEADER)
        .map(str::to_owned)
        .or_else(|| {
            url::form_urlencoded::parse(uri.query()?.as_bytes())
                .find(|(key, _)| key == TENANT_QUERY_PARAM)
                .map(|(_, value)| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        })
}
