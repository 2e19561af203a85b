//! Per-request CSP nonce.
//!
//! The order tracking page opens its event stream from an inline script.
//! That script carries `nonce="..."` and the policy built in
//! `security_headers` allows exactly that nonce.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;

/// Nonce length in bytes before base64.
const NONCE_BYTES: usize = 16;

/// Base64 nonce shared by the page and the `Content-Security-Policy` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CspNonce(pub String);

impl CspNonce {
    fn random() -> Self {
        let mut raw = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut raw);
        Self(STANDARD.encode(raw))
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

/// Attach a fresh nonce to the request, and to the response so the header
/// layer still finds it after handlers run.
pub async fn csp_nonce_middleware(mut request: Request, next: Next) -> Response {
    let nonce = CspNonce::random();
    request.extensions_mut().insert(nonce.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(nonce);
    response
}

impl<S> FromRequestParts<S> for CspNonce
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(nonce) = parts.extensions.get::<Self>() {
            return Ok(nonce.clone());
        }
        // An empty nonce matches no script, so inline code stays blocked.
        tracing::warn!(path = %parts.uri.path(), "Request reached a page without a CSP nonce");
        Ok(Self(String::new()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request as HttpRequest;

    use super::*;

    #[test]
    fn test_nonces_differ_and_encode_sixteen_bytes() {
        let first = CspNonce::random();
        let second = CspNonce::random();
        assert_ne!(first, second);
        assert_eq!(STANDARD.decode(first.value()).unwrap().len(), NONCE_BYTES);
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_yields_empty_nonce() {
        let (mut parts, ()) = HttpRequest::builder()
            .uri("/orders/1")
            .body(())
            .unwrap()
            .into_parts();
        let nonce = CspNonce::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(nonce.value().is_empty());
    }
}
