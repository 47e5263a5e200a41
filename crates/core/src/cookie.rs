//! Session cookie attribute selection.
//!
//! The mini app runs inside the chat client's embedded browser, which loads
//! it as a third-party iframe. Cookies there must be `Secure`,
//! `SameSite=None` and `Partitioned` or browsers drop them. Plain-HTTP local
//! development cannot set `Secure` cookies at all, so it gets a relaxed
//! policy instead.

use serde::{Deserialize, Serialize};

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl SameSitePolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes applied to the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSitePolicy,
    pub partitioned: bool,
    /// Always `None`: the session cookie is host-only.
    pub domain: Option<String>,
}

impl CookiePolicy {
    /// Policy for embedded, cross-site contexts.
    pub const CROSS_SITE: Self = Self {
        secure: true,
        same_site: SameSitePolicy::None,
        partitioned: true,
        domain: None,
    };

    /// Policy for plain-HTTP local development.
    pub const LOCAL: Self = Self {
        secure: false,
        same_site: SameSitePolicy::Lax,
        partitioned: false,
        domain: None,
    };

    /// Short stable fingerprint of the policy, stored in the companion marker
    /// cookie so the perimeter can tell when a re-issue is needed.
    #[must_use]
    pub fn marker(&self) -> String {
        format!(
            "{}-{}-{}",
            if self.secure { "s" } else { "i" },
            self.same_site.as_str().to_ascii_lowercase(),
            if self.partitioned { "p" } else { "u" },
        )
    }

    /// Whether this is the relaxed local-development policy.
    #[must_use]
    pub fn is_local(&self) -> bool {
        *self == Self::LOCAL
    }
}

/// Pick the cookie policy for a request.
///
/// `host` and `proto` are the effective values, i.e. `X-Forwarded-Host` /
/// `X-Forwarded-Proto` when a proxy set them, otherwise `Host` and the URI
/// scheme. Multi-valued forwarded headers are read from their first entry.
#[must_use]
pub fn select_policy(host: Option<&str>, proto: Option<&str>) -> CookiePolicy {
    let https = proto
        .and_then(|p| p.split(',').next())
        .is_some_and(|p| p.trim().eq_ignore_ascii_case("https"));

    let local = host
        .and_then(|h| h.split(',').next())
        .map(strip_port)
        .is_some_and(is_local_host);

    if local && !https {
        CookiePolicy::LOCAL
    } else {
        CookiePolicy::CROSS_SITE
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, optionally followed by :port
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost"
        || host.ends_with(".localhost")
        || host == "127.0.0.1"
        || host == "::1"
        || host == "0.0.0.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_host_gets_cross_site_policy() {
        let policy = select_policy(Some("shop.example.com"), Some("https"));
        assert_eq!(policy, CookiePolicy::CROSS_SITE);
        assert!(policy.secure);
        assert_eq!(policy.same_site, SameSitePolicy::None);
        assert!(policy.partitioned);
        assert_eq!(policy.domain, None);
    }

    #[test]
    fn test_public_host_over_http_stays_cross_site() {
        // Only loopback hosts may drop Secure
        assert_eq!(
            select_policy(Some("shop.example.com"), Some("http")),
            CookiePolicy::CROSS_SITE
        );
    }

    #[test]
    fn test_local_hosts_over_http_get_local_policy() {
        for host in [
            "localhost",
            "localhost:3000",
            "app.localhost",
            "app.localhost:5173",
            "127.0.0.1",
            "127.0.0.1:8080",
            "[::1]",
            "[::1]:3000",
            "0.0.0.0:3000",
            "LOCALHOST",
        ] {
            assert_eq!(
                select_policy(Some(host), Some("http")),
                CookiePolicy::LOCAL,
                "{host}"
            );
            assert_eq!(select_policy(Some(host), None), CookiePolicy::LOCAL, "{host}");
        }
    }

    #[test]
    fn test_local_host_over_https_is_cross_site() {
        assert_eq!(
            select_policy(Some("localhost:3000"), Some("https")),
            CookiePolicy::CROSS_SITE
        );
        assert_eq!(
            select_policy(Some("localhost"), Some("HTTPS, http")),
            CookiePolicy::CROSS_SITE
        );
    }

    #[test]
    fn test_lookalike_hosts_are_not_local() {
        for host in ["localhost.example.com", "127.0.0.1.nip.io", "mylocalhost"] {
            assert_eq!(
                select_policy(Some(host), Some("http")),
                CookiePolicy::CROSS_SITE,
                "{host}"
            );
        }
    }

    #[test]
    fn test_missing_host_is_cross_site() {
        assert_eq!(select_policy(None, None), CookiePolicy::CROSS_SITE);
    }

    #[test]
    fn test_forwarded_host_list_uses_first_entry() {
        assert_eq!(
            select_policy(Some("localhost:3000, proxy.internal"), Some("http")),
            CookiePolicy::LOCAL
        );
    }

    #[test]
    fn test_markers_differ() {
        assert_ne!(CookiePolicy::LOCAL.marker(), CookiePolicy::CROSS_SITE.marker());
        assert_eq!(CookiePolicy::CROSS_SITE.marker(), "s-none-p");
        assert_eq!(CookiePolicy::LOCAL.marker(), "i-lax-u");
    }
}
