//! Per-client rate limiting with `tower_governor`.
//!
//! Two budgets exist: [`auth_rate_limiter`] guards sign-in and registration,
//! [`api_rate_limiter`] guards the JSON API. Vendor webhooks sit outside both
//! because the senders retry on any non-2xx.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Single-address headers set by the edge proxy, most trusted first.
const SINGLE_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-real-ip", "fly-client-ip"];

/// Keys requests by the shopper's address.
///
/// Proxy headers win over the socket peer so that every shopper behind the
/// load balancer gets their own bucket.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let chain = headers.get("x-forwarded-for")?.to_str().ok()?;
    chain.split(',').next()?.trim().parse().ok()
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        header_ip(headers, SINGLE_IP_HEADERS[0])
            .or_else(|| forwarded_for(headers))
            .or_else(|| {
                SINGLE_IP_HEADERS[1..]
                    .iter()
                    .find_map(|name| header_ip(headers, name))
            })
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Governor layer keyed by [`ClientIpKeyExtractor`].
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Build a limiter that refills one token every `refill_secs` seconds up to
/// `burst` tokens.
///
/// # Panics
///
/// Panics if either argument is zero. Callers in this module pass constants.
fn limiter(refill_secs: u64, burst: u32) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(refill_secs)
        .burst_size(burst)
        .finish()
        .expect("non-zero refill period and burst");
    GovernorLayer::new(Arc::new(config))
}

/// Login and registration: burst of 5, then one attempt every 6 seconds.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    limiter(6, 5)
}

/// Cart, checkout, wishlist and catalog: burst of 50, then one per second.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    limiter(1, 50)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn extract(req: &Request<()>) -> Option<IpAddr> {
        ClientIpKeyExtractor.extract(req).ok()
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(extract(&req), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_cloudflare_header_beats_forwarded_for() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .header("cf-connecting-ip", "192.0.2.44")
            .body(())
            .unwrap();
        assert_eq!(extract(&req), Some("192.0.2.44".parse().unwrap()));
    }

    #[test]
    fn test_garbage_header_falls_through() {
        let req = Request::builder()
            .header("x-real-ip", "not-an-ip")
            .header("fly-client-ip", "2001:db8::1")
            .body(())
            .unwrap();
        assert_eq!(extract(&req), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_falls_back_to_peer_address() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("198.51.100.2:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(extract(&req), Some("198.51.100.2".parse().unwrap()));
    }

    #[test]
    fn test_no_address_is_an_error() {
        let req = Request::builder().body(()).unwrap();
        assert_eq!(extract(&req), None);
    }
}
