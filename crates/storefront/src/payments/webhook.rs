//! Payment webhook verification and event parsing.
//!
//! The `stripe-signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is HMAC-SHA256 over `"{t}.{payload}"` keyed by the endpoint
//! secret. Any matching `v1` is accepted within the timestamp tolerance.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payload, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Event type for a captured payment.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no signature matched")]
    Mismatch,
}

/// Verify a `stripe-signature` header against the raw request body.
///
/// # Errors
///
/// Returns `SignatureError` if the header cannot be parsed, the timestamp is
/// outside `tolerance_secs` of `now`, or no `v1` signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    for signature in &signatures {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Compute a `stripe-signature` header value for a payload.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return format!("t={timestamp}");
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// The payment intent id when the event object is a payment intent.
    #[must_use]
    pub fn payment_intent_id(&self) -> Option<&str> {
        let object = &self.data.object;
        if object.get("object").and_then(serde_json::Value::as_str) != Some("payment_intent") {
            return None;
        }
        object.get("id").and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn test_signed_payload_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(payload, SECRET, NOW);
        assert_eq!(verify_signature(payload, &header, SECRET, NOW + 10, 300), Ok(()));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign_payload(br#"{"id":"evt_1"}"#, SECRET, NOW);
        assert_eq!(
            verify_signature(br#"{"id":"evt_2"}"#, &header, SECRET, NOW, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, NOW - 301);
        assert_eq!(
            verify_signature(payload, &header, SECRET, NOW, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let payload = b"{}";
        let good = sign_payload(payload, SECRET, NOW);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={v1}", "00".repeat(32));
        assert_eq!(verify_signature(payload, &header, SECRET, NOW, 300), Ok(()));
    }

    #[test]
    fn test_missing_parts_are_malformed() {
        assert_eq!(
            verify_signature(b"{}", "v1=abcd", SECRET, NOW, 300),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(b"{}", &format!("t={NOW}"), SECRET, NOW, 300),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_event_exposes_payment_intent_id() {
        let event: Event = serde_json::from_str(
            r#"{"id":"evt_1","type":"payment_intent.succeeded",
                "data":{"object":{"object":"payment_intent","id":"pi_123"}}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, PAYMENT_INTENT_SUCCEEDED);
        assert_eq!(event.payment_intent_id(), Some("pi_123"));
    }
}
