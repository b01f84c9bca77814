use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::rate_limit::RateLimitResult;

/// Axum extractor that resolves the TCP peer IP from `ConnectInfo<SocketAddr>`.
///
/// Returns `None` when `ConnectInfo` is unavailable (e.g. in tests that use
/// `Router::oneshot` without `into_make_service_with_connect_info`).
pub struct PeerIp(pub Option<String>);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for PeerIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        Ok(Self(ip))
    }
}

/// Extracts the client IP, preferring `X-Forwarded-For` over the TCP peer
/// address. There is no reverse proxy in front of this service by default,
/// so this mostly falls back to the peer address; kept symmetrical in case
/// a deployment sits behind one.
pub fn extract_ip(headers: &HeaderMap, peer_ip: Option<&str>) -> String {
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
    {
        return ip;
    }
    peer_ip.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

/// Builds `X-RateLimit-*` response headers from a [`RateLimitResult`].
#[allow(clippy::unwrap_used)]
pub fn rate_limit_headers(result: &RateLimitResult) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", result.limit.to_string().parse().unwrap());
    headers.insert("x-ratelimit-remaining", result.remaining.to_string().parse().unwrap());
    headers.insert("x-ratelimit-reset", result.reset_after_secs.to_string().parse().unwrap());
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ip_from_forwarded_for_single_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.50".parse().unwrap());
        assert_eq!(extract_ip(&headers, None), "203.0.113.50");
    }

    #[test]
    fn extract_ip_from_forwarded_for_multiple_ips() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.50, 70.41.3.18, 150.172.238.178".parse().unwrap(),
        );
        assert_eq!(extract_ip(&headers, None), "203.0.113.50");
    }

    #[test]
    fn extract_ip_returns_peer_when_header_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip(&headers, Some("192.168.1.1")), "192.168.1.1");
    }

    #[test]
    fn extract_ip_returns_unknown_when_no_header_and_no_peer() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip(&headers, None), "unknown");
    }

    #[test]
    fn rate_limit_headers_contains_correct_values() {
        let result = RateLimitResult {
            allowed: true,
            limit: 60,
            remaining: 42,
            reset_after_secs: 30,
        };
        let headers = rate_limit_headers(&result);
        assert_eq!(headers["x-ratelimit-limit"], "60");
        assert_eq!(headers["x-ratelimit-remaining"], "42");
        assert_eq!(headers["x-ratelimit-reset"], "30");
    }
}
