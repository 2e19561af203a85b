//! Response security headers.
//!
//! The content security policy is locked down apart from the payment
//! processor's card element, which needs its script, API and frames.

use axum::{
    extract::Request,
    http::{
        HeaderName, HeaderValue,
        header::CONTENT_SECURITY_POLICY,
    },
    middleware::Next,
    response::Response,
};

use super::csp::CspNonce;

/// Build the CSP header value, with the per-request nonce when there is one.
///
/// ```text
/// default-src 'none';
/// script-src 'self' 'nonce-…' https://js.stripe.com;
/// style-src 'self';
/// font-src 'self';
/// img-src 'self' https://cdn.sanity.io;
/// connect-src 'self' https://api.stripe.com;
/// frame-src https://js.stripe.com https://hooks.stripe.com;
/// object-src 'none';
/// base-uri 'self';
/// form-action 'self';
/// frame-ancestors 'none';
/// upgrade-insecure-requests
/// ```
#[must_use]
pub fn content_security_policy(nonce: Option<&str>) -> String {
    let script_src = match nonce.filter(|n| !n.is_empty()) {
        Some(nonce) => format!("script-src 'self' 'nonce-{nonce}' https://js.stripe.com"),
        None => "script-src 'self' https://js.stripe.com".to_string(),
    };
    [
        "default-src 'none'",
        &script_src,
        "style-src 'self'",
        "font-src 'self'",
        "img-src 'self' https://cdn.sanity.io",
        "connect-src 'self' https://api.stripe.com",
        "frame-src https://js.stripe.com https://hooks.stripe.com",
        "object-src 'none'",
        "base-uri 'self'",
        "form-action 'self'",
        "frame-ancestors 'none'",
        "upgrade-insecure-requests",
    ]
    .join("; ")
}

/// Permissions the storefront never uses. Payment is allowed only for the
/// processor's card frame.
const PERMISSIONS_POLICY: &str = "accelerometer=(), autoplay=(), camera=(), \
     display-capture=(), geolocation=(), gyroscope=(), magnetometer=(), \
     microphone=(), payment=(self \"https://js.stripe.com\"), \
     publickey-credentials-get=(), usb=(), xr-spatial-tracking=()";

/// Headers that do not vary per request.
const STATIC_HEADERS: [(&str, &str); 8] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", PERMISSIONS_POLICY),
    ("cache-control", "no-store, max-age=0"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("x-dns-prefetch-control", "off"),
];

/// Add the [`STATIC_HEADERS`] and a nonce-aware `Content-Security-Policy`
/// to every response.
///
/// The nonce comes from the request extensions, or from the response when an
/// inner layer replaced the request.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let request_nonce = request.extensions().get::<CspNonce>().cloned();
    let mut response = next.run(request).await;
    let nonce = request_nonce.or_else(|| response.extensions().get::<CspNonce>().cloned());

    let headers = response.headers_mut();
    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    let csp = content_security_policy(nonce.as_ref().map(CspNonce::value));
    match HeaderValue::from_str(&csp) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::error!(error = %e, "CSP header value rejected"),
    }

    response
}
