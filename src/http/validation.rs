use std::net::IpAddr;

use url::Url;

use crate::error::{Error, Result};

const BLOCKED_HOSTNAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Rejects a target URL for SSRF per spec §4.3.1. Checks, in order: scheme,
/// literal blocked hostnames (case-insensitive, regardless of whether they'd
/// also resolve privately), and the literal host parsed as an IP address.
/// Does not perform DNS resolution — callers that need to catch a hostname
/// that merely *resolves* to an internal address should also call
/// `validate_resolved`.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!(
                "scheme '{other}' is not allowed, only http/https"
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Validation("URL has no host".to_string()))?;

    if host.is_empty() {
        return Err(Error::Validation("URL has an empty host".to_string()));
    }

    let lower = host.to_lowercase();
    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return Err(Error::Validation(format!(
            "host '{host}' is explicitly blocked"
        )));
    }

    if let Ok(ip) = lower.parse::<IpAddr>() {
        validate_ip(ip)?;
    }

    Ok(parsed)
}

/// Rejects an IP address reachable via loopback, private, link-local,
/// multicast, or unspecified ranges, for both IPv4 and IPv6.
pub fn validate_ip(ip: IpAddr) -> Result<()> {
    let blocked = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || is_unique_local_v6(&v6)
                || is_unicast_link_local_v6(&v6)
        }
    };

    if blocked {
        Err(Error::Validation(format!(
            "address {ip} resolves to a disallowed range"
        )))
    } else {
        Ok(())
    }
}

fn is_unique_local_v6(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

fn is_unicast_link_local_v6(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

/// DNS-resolution-based check layered on top of `validate_url`: a hostname
/// can pass the literal-host test and still resolve to an internal address.
/// Resolves via the async resolver and validates every returned address;
/// rejects if any of them is disallowed, since a server can return multiple
/// A/AAAA records and an attacker only needs one to land internally.
pub async fn validate_resolved(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Validation("URL has no host".to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        return validate_ip(ip);
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let lookup_target = format!("{host}:{port}");

    let addrs = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| Error::Validation(format!("DNS resolution failed for '{host}': {e}")))?;

    let mut any = false;
    for addr in addrs {
        any = true;
        validate_ip(addr.ip())?;
    }

    if !any {
        return Err(Error::Validation(format!(
            "DNS resolution for '{host}' returned no addresses"
        )));
    }

    Ok(())
}
