//! Checkout API.
//!
//! The [`CheckoutSession`] lives in the HTTP session and is saved after
//! every successful step. Step guards live on the session itself, so a
//! stale request (say, selecting a rate after moving to payment) fails with
//! 409 instead of rewinding the flow.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use threadline_core::{
    CheckoutSession, CheckoutStep, OrderId, OrderTotals, ShippingAddress, ShippingRate,
    calculate_order_total,
};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::routes::session_data;
use crate::services::CheckoutService;
use crate::state::AppState;

/// Checkout state as the browser sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub step: CheckoutStep,
    pub address: Option<ShippingAddress>,
    pub rates: Vec<ShippingRate>,
    pub selected_rate_id: Option<String>,
    pub totals: Option<OrderTotals>,
    pub payment: Option<PaymentView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub publishable_key: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: ShippingAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    pub rate_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub order_id: OrderId,
    pub redirect_url: String,
}

fn service(state: &AppState) -> CheckoutService<'_> {
    CheckoutService::new(
        state.stores(),
        state.payments(),
        state.shipping(),
        state.config().stripe.currency,
    )
}

async fn view(
    state: &AppState,
    session: &Session,
    checkout: &CheckoutSession,
) -> Result<CheckoutView> {
    let cart = session_data::cart(session).await?;
    let totals = checkout
        .selected_rate()
        .map(|rate| calculate_order_total(cart.items(), rate.price));
    Ok(CheckoutView {
        step: checkout.step,
        address: checkout.address.clone(),
        rates: checkout.rates.clone(),
        selected_rate_id: checkout.selected_rate_id.clone(),
        totals,
        payment: checkout.payment.as_ref().map(|p| PaymentView {
            client_secret: p.client_secret.clone(),
            payment_intent_id: p.payment_intent_id.clone(),
            publishable_key: state.config().stripe.publishable_key.clone(),
        }),
    })
}

/// Load the session's checkout, starting one if there is none.
async fn current(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<CheckoutSession> {
    if let Some(checkout) = session_data::checkout(session).await? {
        return Ok(checkout);
    }
    let checkout = service(state).start(user.map(|u| u.id)).await;
    session_data::save_checkout(session, &checkout).await?;
    Ok(checkout)
}

/// `GET /api/checkout`
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutView>> {
    let checkout = current(&state, &session, user.as_ref()).await?;
    Ok(Json(view(&state, &session, &checkout).await?))
}

/// `POST /api/checkout/address`
///
/// Validates the address and fetches rates for the cart's parcel.
#[instrument(skip_all)]
pub async fn submit_address(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<AddressRequest>,
) -> Result<Json<CheckoutView>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    let cart = session_data::cart(&session).await?;
    service(&state)
        .submit_address(&mut checkout, &cart, request.address, user.map(|u| u.id))
        .await?;
    session_data::save_checkout(&session, &checkout).await?;
    Ok(Json(view(&state, &session, &checkout).await?))
}

/// `POST /api/checkout/rate`
#[instrument(skip(state, session, user, request), fields(rate_id = %request.rate_id))]
pub async fn select_rate(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<RateRequest>,
) -> Result<Json<CheckoutView>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    checkout.select_rate(&request.rate_id)?;
    session_data::save_checkout(&session, &checkout).await?;
    Ok(Json(view(&state, &session, &checkout).await?))
}

/// `POST /api/checkout/review`
pub async fn continue_to_review(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutView>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    checkout.continue_to_review()?;
    session_data::save_checkout(&session, &checkout).await?;
    Ok(Json(view(&state, &session, &checkout).await?))
}

/// `POST /api/checkout/back`
///
/// One step back: payment to review, or review to shipping.
pub async fn back(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutView>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    if checkout.step == CheckoutStep::Payment {
        checkout.back_to_review()?;
    } else {
        checkout.back_to_shipping()?;
    }
    session_data::save_checkout(&session, &checkout).await?;
    Ok(Json(view(&state, &session, &checkout).await?))
}

/// `POST /api/checkout/payment`
///
/// Creates the payment intent, or hands back the one already held when
/// the cart has not changed since.
#[instrument(skip_all)]
pub async fn continue_to_payment(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<PaymentView>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    let cart = session_data::cart(&session).await?;
    let handle = service(&state)
        .continue_to_payment(&mut checkout, &cart, user.map(|u| u.id))
        .await?;
    session_data::save_checkout(&session, &checkout).await?;

    add_breadcrumb(
        "checkout",
        "Payment intent ready",
        Some(&[("payment_intent_id", handle.payment_intent_id.as_str())]),
    );
    Ok(Json(PaymentView {
        client_secret: handle.client_secret,
        payment_intent_id: handle.payment_intent_id,
        publishable_key: state.config().stripe.publishable_key.clone(),
    }))
}

/// `POST /api/checkout/complete`
///
/// Called after the browser confirmed the payment. Safe to retry after an
/// order creation failure.
#[instrument(skip(state, session, user, request), fields(payment_intent_id = %request.payment_intent_id))]
pub async fn complete(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>> {
    let mut checkout = current(&state, &session, user.as_ref()).await?;
    let mut cart = session_data::cart(&session).await?;

    let completed = service(&state)
        .complete(
            &mut checkout,
            &mut cart,
            &request.payment_intent_id,
            user.map(|u| u.id),
        )
        .await?;

    session_data::save_cart(&session, &cart).await?;
    session_data::clear_checkout(&session).await?;
    session_data::remember_order(&session, completed.order.id).await?;

    Ok(Json(CompleteResponse {
        order_id: completed.order.id,
        redirect_url: completed.redirect_url(),
    }))
}
