//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `location_rate_limiter`: Strict limits for endpoints that reach the
//!   geocoder (~20/min)
//! - `api_rate_limiter`: Relaxed limits for cart and catalog endpoints (~60/min)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers that carry the client IP, most trusted first.
///
/// Cloudflare sits in front of Fly.io, so its header wins. `x-forwarded-for`
/// may hold a chain; the first entry is the client.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "fly-client-ip",
];

fn header_ip<T>(req: &Request<T>, name: &str) -> Option<IpAddr> {
    req.headers()
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Key extractor for the client IP behind Cloudflare and Fly.io.
///
/// Falls back to the peer address for direct connections (local
/// development, tests).
#[derive(Clone, Copy)]
pub struct CloudflareIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for CloudflareIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        CLIENT_IP_HEADERS
            .iter()
            .find_map(|name| header_ip(req, name))
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
///
/// Uses `CloudflareIpKeyExtractor` to get the real client IP from Cloudflare
/// and Fly.io proxy headers.
pub type RateLimiterLayer =
    GovernorLayer<CloudflareIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Token bucket parameters for one route group.
#[derive(Debug, Clone, Copy)]
struct Quota {
    /// Seconds to replenish one request.
    replenish_secs: u64,
    burst: u32,
}

/// Location check and commit reach the geocoder: ~20 requests per minute.
const LOCATION_QUOTA: Quota = Quota {
    replenish_secs: 3,
    burst: 10,
};

/// Cart, checkout and catalog: ~60 requests per minute with room for bursts.
const API_QUOTA: Quota = Quota {
    replenish_secs: 1,
    burst: 50,
};

/// # Panics
///
/// Panics only if `quota` has a zero interval or burst, which the constants
/// above never do.
fn limiter(quota: Quota) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(CloudflareIpKeyExtractor)
        .per_second(quota.replenish_secs)
        .burst_size(quota.burst)
        .finish()
        .expect("rate limiter quotas are non-zero");
    GovernorLayer::new(Arc::new(config))
}

/// Rate limiter for the location endpoints.
#[must_use]
pub fn location_rate_limiter() -> RateLimiterLayer {
    limiter(LOCATION_QUOTA)
}

/// Rate limiter for the cart, checkout and catalog endpoints.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    limiter(API_QUOTA)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/location");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_key_prefers_cloudflare_header() {
        let req = request(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        let key = CloudflareIpKeyExtractor.extract(&req).ok();
        assert_eq!(key, "203.0.113.7".parse().ok());
    }

    #[test]
    fn test_key_uses_first_forwarded_ip() {
        let req = request(&[("x-forwarded-for", "198.51.100.4, 10.0.0.2")]);
        let key = CloudflareIpKeyExtractor.extract(&req).ok();
        assert_eq!(key, "198.51.100.4".parse().ok());
    }

    #[test]
    fn test_key_falls_back_to_peer_address() {
        let mut req = request(&[]);
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(CloudflareIpKeyExtractor.extract(&req).ok(), Some(peer.ip()));
    }

    #[test]
    fn test_key_missing_headers_is_error() {
        assert!(CloudflareIpKeyExtractor.extract(&request(&[])).is_err());
    }
}
