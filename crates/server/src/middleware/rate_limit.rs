//! Fixed-window rate limiting over an injected [`CounterStore`].
//!
//! Two limits are applied:
//! - login attempts, keyed by client address
//! - gated API requests, keyed by account ID
//!
//! A failing counter store never blocks traffic: the failure is logged and
//! the request proceeds.

use std::net::IpAddr;

use axum::http::HeaderMap;
use chrono::Utc;
use tracing::warn;

use miniapp_core::CounterStore;

use crate::config::RateLimit;
use crate::error::AppError;

// =============================================================================
// Client Address (Cloudflare + Fly.io)
// =============================================================================

/// Best-effort client address.
///
/// Checks Cloudflare's `CF-Connecting-IP` first, then the first entry of
/// `X-Forwarded-For`, then `X-Real-IP`, then Fly.io's `Fly-Client-IP`, and
/// finally the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    let parse = |name: &str, first_of_list: bool| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| {
                if first_of_list {
                    s.split(',').next()
                } else {
                    Some(s)
                }
            })
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    parse("cf-connecting-ip", false)
        .or_else(|| parse("x-forwarded-for", true))
        .or_else(|| parse("x-real-ip", false))
        .or_else(|| parse("fly-client-ip", false))
        .or(peer)
}

// =============================================================================
// Enforcement
// =============================================================================

/// Counter key for login attempts from `ip`.
#[must_use]
pub fn login_key(ip: Option<IpAddr>) -> String {
    ip.map_or_else(|| "login:unknown".to_owned(), |ip| format!("login:{ip}"))
}

/// Count one hit against `key` and refuse it if the window is exhausted.
///
/// # Errors
///
/// Returns `AppError::RateLimited` once more than `limit.limit` hits land in
/// one window.
pub async fn enforce(
    counters: &dyn CounterStore,
    key: &str,
    limit: RateLimit,
) -> Result<(), AppError> {
    let snapshot = match counters.increment(key, limit.window).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "rate-limit store unavailable, allowing request");
            return Ok(());
        }
    };

    if snapshot.count <= limit.limit {
        return Ok(());
    }

    let remaining = (snapshot.reset_at - Utc::now()).num_seconds();
    let retry_after_secs = u64::try_from(remaining).unwrap_or(0).max(1);
    warn!(key, count = snapshot.count, retry_after_secs, "rate limit exceeded");
    Err(AppError::RateLimited { retry_after_secs })
}
