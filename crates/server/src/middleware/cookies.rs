//! Session and policy-marker cookie writing.

use chrono::{DateTime, Utc};
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite, time},
};

use miniapp_core::{CookiePolicy, SameSitePolicy};

use crate::config::SessionConfig;

const fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

fn build(name: String, value: String, policy: &CookiePolicy, max_age_secs: i64) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(same_site(policy.same_site))
        .partitioned(policy.partitioned)
        .max_age(time::Duration::seconds(max_age_secs));
    if let Some(domain) = policy.domain.clone() {
        builder = builder.domain(domain);
    }
    builder.build()
}

/// Write the session cookie and its policy marker.
///
/// Both cookies live until the credential expires; an already-expired
/// credential writes a zero max-age.
pub fn write_session(
    cookies: &Cookies,
    config: &SessionConfig,
    token: &str,
    expires_at: DateTime<Utc>,
    policy: &CookiePolicy,
    now: DateTime<Utc>,
) {
    let max_age_secs = (expires_at - now).num_seconds().max(0);
    cookies.add(build(
        config.cookie_name.clone(),
        token.to_owned(),
        policy,
        max_age_secs,
    ));
    cookies.add(build(
        config.marker_cookie_name(),
        policy.marker(),
        policy,
        max_age_secs,
    ));
}

/// Expire the session cookie and its policy marker.
///
/// Expiry is sent even when the request carried neither cookie.
pub fn clear_session(cookies: &Cookies, config: &SessionConfig, policy: &CookiePolicy) {
    cookies.add(build(config.cookie_name.clone(), String::new(), policy, 0));
    cookies.add(build(config.marker_cookie_name(), String::new(), policy, 0));
}
