//! Client identity resolution for admission control.
//!
//! The intake service sits behind a reverse proxy, so the peer socket
//! address is always the proxy. Identity is taken from proxy headers:
//!
//! 1. First entry of `X-Forwarded-For`, trimmed
//! 2. `X-Real-IP`, trimmed
//! 3. [`UNKNOWN_CLIENT`] for everything else
//!
//! Requests without either header all share the sentinel bucket. A client
//! that strips both headers can therefore exhaust the quota of every other
//! unattributable client, but it is never admitted untracked.

use http::HeaderMap;

/// Forwarded-address list header set by the edge proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-address header set by some proxies instead of `X-Forwarded-For`.
pub const REAL_IP: &str = "x-real-ip";

/// Shared identity for requests with no resolvable address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client identity used to key rate buckets.
///
/// Only reads headers; never fails. Header values that are not visible
/// ASCII are treated as absent.
pub fn resolve_client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    let real_ip = headers
        .get(REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match real_ip {
        Some(addr) => addr.to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}
