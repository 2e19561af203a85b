//! Payment processor integration (Stripe-compatible REST API).
//!
//! # Architecture
//!
//! - [`PaymentGateway`] is the seam the checkout service talks to
//! - [`StripeClient`] implements it over form-encoded REST with `reqwest`
//! - [`webhook`] verifies `stripe-signature` headers and parses events
//!
//! Amounts cross this boundary in minor units (`total * 100`).

mod stripe;
pub mod webhook;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use threadline_core::CurrencyCode;

pub use stripe::StripeClient;

/// Errors that can occur when talking to the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor rejected the request.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
        error_type: Option<String>,
    },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Amount cannot be charged.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl PaymentError {
    /// Status code to relay to the browser.
    ///
    /// Processor 4xx responses pass through; transport failures are 502.
    #[must_use]
    pub const fn relay_status(&self) -> u16 {
        match self {
            Self::Api { status, .. } if *status >= 400 && *status < 500 => *status,
            Self::InvalidAmount(_) => 400,
            _ => 502,
        }
    }

    /// Processor error code, e.g. `card_declined`.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Processor error type, e.g. `invalid_request_error`.
    #[must_use]
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Self::Api { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }
}

/// Request to create a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    /// Amount in minor units.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub receipt_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Payment intent as returned by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// Payment processor operations used by checkout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_intent(&self, payment_intent_id: &str)
    -> Result<PaymentIntent, PaymentError>;
}
