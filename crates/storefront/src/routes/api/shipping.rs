//! Shipping aggregator pass-throughs and the tracking webhook.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use threadline_core::{CartItem, ShippingAddress, ShippingRate, parcel_weight_kg};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::WebhookService;
use crate::shipping::webhook::SIGNATURE_HEADER;
use crate::shipping::{RateRequest, Track, Transaction};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RatesRequest {
    pub address: ShippingAddress,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub rates: Vec<ShippingRate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    pub rate_id: String,
}

/// `POST /api/shipping/rates`
#[instrument(skip_all)]
pub async fn rates(
    State(state): State<AppState>,
    Json(request): Json<RatesRequest>,
) -> Result<Json<RatesResponse>> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest("items must not be empty".to_string()));
    }
    let address = request.address.normalized();
    address.validate()?;

    let rates = state
        .shipping()
        .get_rates(&RateRequest {
            weight_kg: parcel_weight_kg(&request.items),
            to: address,
        })
        .await?;
    Ok(Json(RatesResponse { rates }))
}

/// `POST /api/shipping/label`
///
/// Buys a label outside checkout, e.g. a replacement parcel. Admin only.
#[instrument(skip(state, admin, request), fields(rate_id = %request.rate_id))]
pub async fn label(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<LabelRequest>,
) -> Result<Json<Transaction>> {
    tracing::info!(admin_id = %admin.id, "Manual label purchase");
    Ok(Json(state.shipping().purchase_label(&request.rate_id).await?))
}

/// `GET /api/shipping/track/{carrier}/{tracking}`
#[instrument(skip(state))]
pub async fn track(
    State(state): State<AppState>,
    Path((carrier, tracking_number)): Path<(String, String)>,
) -> Result<Json<Track>> {
    Ok(Json(
        state.shipping().track(&carrier, &tracking_number).await?,
    ))
}

/// `POST /api/shipping/webhook`
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = WebhookService::new(state.stores(), state.events())
        .handle_shipping_event(
            &body,
            signature,
            state.config().shippo.webhook_secret.expose_secret(),
        )
        .await?;
    tracing::debug!(?outcome, "Shipping webhook handled");
    Ok(StatusCode::OK)
}
