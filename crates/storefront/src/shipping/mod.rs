//! Shipping aggregator integration (Shippo-compatible REST API).
//!
//! Rates, label purchase and tracking go through [`ShippingProvider`];
//! [`ShippoClient`] is the HTTP implementation. Aggregator objects that the
//! storefront relays verbatim keep unknown fields in `extra`.

mod shippo;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use threadline_core::{ShippingAddress, ShippingRate};

pub use shippo::ShippoClient;

/// Errors that can occur when talking to the shipping aggregator.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Label purchase did not succeed.
    #[error("label purchase failed: {0}")]
    LabelFailed(String),
}

/// Destination and parcel for a rate quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRequest {
    pub to: ShippingAddress,
    pub weight_kg: Decimal,
}

/// A purchased label (aggregator transaction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub object_id: String,
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub label_url: Option<String>,
    #[serde(default)]
    pub tracking_url_provider: Option<String>,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<TransactionMessage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Transaction {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("SUCCESS")
    }

    /// Aggregator messages joined for logging.
    #[must_use]
    pub fn message_summary(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    #[serde(default)]
    pub text: String,
}

/// Tracking object for a shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracking_status: Option<TrackingStatus>,
    #[serde(default)]
    pub tracking_history: Vec<TrackingStatus>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One status reported by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub status: String,
    #[serde(default)]
    pub status_details: String,
    #[serde(default)]
    pub status_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<TrackingLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl TrackingLocation {
    /// `"City, ST, Country"` from whichever parts are present.
    #[must_use]
    pub fn display(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Shipping aggregator operations.
#[async_trait]
pub trait ShippingProvider: Send + Sync {
    /// Quote rates from the store origin to the destination.
    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>, ShippingError>;

    /// Buy a label for a previously quoted rate.
    async fn purchase_label(&self, rate_id: &str) -> Result<Transaction, ShippingError>;

    async fn track(&self, carrier: &str, tracking_number: &str) -> Result<Track, ShippingError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_keeps_unknown_fields() {
        let transaction: Transaction = serde_json::from_str(
            r#"{"object_id":"tx_1","status":"SUCCESS","tracking_number":"9400",
                "label_url":"https://labels.example/1.pdf","rate":"rate_1"}"#,
        )
        .unwrap();

        assert!(transaction.is_success());
        assert_eq!(transaction.extra.get("rate").unwrap(), "rate_1");

        let relayed = serde_json::to_value(&transaction).unwrap();
        assert_eq!(relayed["rate"], "rate_1");
        assert_eq!(relayed["tracking_number"], "9400");
    }

    #[test]
    fn test_location_display_skips_missing_parts() {
        let location = TrackingLocation {
            city: Some("Memphis".to_owned()),
            state: None,
            zip: Some("38118".to_owned()),
            country: Some("US".to_owned()),
        };
        assert_eq!(location.display().as_deref(), Some("Memphis, US"));

        let empty = TrackingLocation {
            city: None,
            state: Some(" ".to_owned()),
            zip: None,
            country: None,
        };
        assert_eq!(empty.display(), None);
    }
}
