//! Payment intent creation and the payment webhook.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use threadline_core::{CartItem, to_minor_units};

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::payments::{CreateIntent, PaymentError};
use crate::services::WebhookService;
use crate::state::AppState;

/// Header carrying the payment webhook signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    /// Amount in standard currency units.
    pub amount: Decimal,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// `POST /api/create-payment-intent`
///
/// Processor errors relay the processor's status with `{error, code, type}`.
#[instrument(skip_all)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<CreatePaymentIntentResponse>> {
    let amount = to_minor_units(request.amount)
        .map_err(|e| AppError::Payment(PaymentError::InvalidAmount(e.to_string())))?;
    if amount <= 0 {
        return Err(PaymentError::InvalidAmount("amount must be positive".to_string()).into());
    }

    let mut metadata = request.metadata;
    let user_id = user
        .map(|u| u.id.to_string())
        .or(request.user_id)
        .unwrap_or_else(|| "guest".to_string());
    metadata.insert("user_id".to_string(), user_id);
    metadata.insert("item_count".to_string(), request.items.len().to_string());

    let intent = state
        .payments()
        .create_intent(&CreateIntent {
            amount,
            currency: state.config().stripe.currency,
            receipt_email: request.email,
            metadata,
        })
        .await?;

    let client_secret = intent
        .client_secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PaymentError::Parse("payment intent has no client secret".to_string()))?;

    Ok(Json(CreatePaymentIntentResponse {
        client_secret,
        payment_intent_id: intent.id,
    }))
}

/// `POST /api/webhooks/stripe`
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = WebhookService::new(state.stores(), state.events())
        .handle_payment_event(
            &body,
            signature,
            state.config().stripe.webhook_secret.expose_secret(),
        )
        .await?;
    tracing::debug!(?outcome, "Payment webhook handled");
    Ok(StatusCode::OK)
}
