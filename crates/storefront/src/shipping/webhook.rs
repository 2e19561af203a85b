//! Shipping webhook verification and payload types.
//!
//! `Shippo-Signature` carries the hex HMAC-SHA256 of the raw request body,
//! keyed by `SHIPPO_WEBHOOK_SECRET`. A `v1=` prefix is tolerated.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::Track;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "shippo-signature";

/// Event type for carrier scans.
pub const TRACK_UPDATED: &str = "track_updated";

/// Verify a body signature in constant time.
#[must_use]
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> bool {
    let value = header.trim();
    let value = value.strip_prefix("v1=").unwrap_or(value);
    let Ok(expected) = hex::decode(value) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Hex signature for a payload.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub test: bool,
    pub data: Track,
}
