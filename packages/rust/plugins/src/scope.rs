//! URL filtering for network-facing plugins: scheme, glob and SSRF checks.

use std::net::IpAddr;

use regex::Regex;
use url::Url;

/// Decides whether a URL may be fetched.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    /// Include patterns (if non-empty, the path must match at least one).
    include_patterns: Vec<Regex>,
    /// Exclude patterns (if the path matches any, it is rejected).
    exclude_patterns: Vec<Regex>,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private: bool,
}

impl UrlFilter {
    pub fn new(include: &[String], exclude: &[String], allow_private: bool) -> Self {
        Self {
            include_patterns: include.iter().filter_map(|p| glob_to_regex(p)).collect(),
            exclude_patterns: exclude.iter().filter_map(|p| glob_to_regex(p)).collect(),
            allow_private,
        }
    }

    pub fn accepts(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        if !self.allow_private && is_ssrf_target(url) {
            tracing::warn!(%url, "SSRF protection: blocked");
            return false;
        }

        let path = url.path();

        if self.exclude_patterns.iter().any(|p| p.is_match(path)) {
            return false;
        }

        self.include_patterns.is_empty() || self.include_patterns.iter().any(|p| p.is_match(path))
    }
}

/// Convert a glob-like pattern to a regex.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
