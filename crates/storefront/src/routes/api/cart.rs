//! Cart API.
//!
//! The session cart is the source of truth. For signed-in users every
//! mutation is mirrored to the stored cart on a best-effort basis. While a
//! checkout has a payment open the cart is frozen and edits answer 409.

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use threadline_core::{Cart, CartItem, ProductId, QuantityUpdate};

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::routes::session_data;
use crate::services::CartService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub item_count: u32,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().to_vec(),
            subtotal: cart.subtotal(),
            item_count: cart.total_quantity(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub slug: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

fn service(state: &AppState) -> CartService<'_> {
    CartService::new(
        state.stores().carts.as_ref(),
        state.config().cart_sync_policy,
    )
}

/// Refuse edits while a payment is open against the cart.
async fn ensure_editable(session: &Session) -> Result<()> {
    if let Some(checkout) = session_data::checkout(session).await? {
        checkout.ensure_cart_editable()?;
    }
    Ok(())
}

/// `GET /api/cart`
pub async fn show(session: Session) -> Result<Json<CartResponse>> {
    let cart = session_data::cart(&session).await?;
    Ok(Json((&cart).into()))
}

/// `POST /api/cart/items`
///
/// Prices come from the catalog, never from the request.
#[instrument(skip(state, session, user, request), fields(slug = %request.slug))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
    }
    let product = state.catalog().product_by_slug(&request.slug).await?;
    if !product.offers_size(request.size.as_deref()) {
        return Err(AppError::BadRequest(format!(
            "size is not available for {}",
            product.slug
        )));
    }

    ensure_editable(&session).await?;
    let mut cart = session_data::cart(&session).await?;
    let item = product.cart_item(request.quantity, request.size, request.color);
    service(&state)
        .add_item(&mut cart, item, user.map(|u| u.id))
        .await;
    session_data::save_cart(&session, &cart).await?;
    Ok(Json((&cart).into()))
}

/// `PATCH /api/cart/items/{product_id}`
///
/// A quantity below 1 leaves the cart unchanged.
#[instrument(skip(state, session, user))]
pub async fn update_quantity(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<ProductId>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>> {
    ensure_editable(&session).await?;
    let mut cart = session_data::cart(&session).await?;
    let outcome = service(&state)
        .update_quantity(&mut cart, &product_id, request.quantity, user.map(|u| u.id))
        .await;

    match outcome {
        QuantityUpdate::NotFound => Err(AppError::NotFound(format!("cart line {product_id}"))),
        QuantityUpdate::BelowFloor => Ok(Json((&cart).into())),
        QuantityUpdate::Updated => {
            session_data::save_cart(&session, &cart).await?;
            Ok(Json((&cart).into()))
        }
    }
}

/// `DELETE /api/cart/items/{product_id}`
#[instrument(skip(state, session, user))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartResponse>> {
    ensure_editable(&session).await?;
    let mut cart = session_data::cart(&session).await?;
    if service(&state)
        .remove_item(&mut cart, &product_id, user.map(|u| u.id))
        .await
        .is_some()
    {
        session_data::save_cart(&session, &cart).await?;
    }
    Ok(Json((&cart).into()))
}

/// `DELETE /api/cart`
#[instrument(skip(state, session, user))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CartResponse>> {
    ensure_editable(&session).await?;
    let mut cart = session_data::cart(&session).await?;
    service(&state)
        .clear_cart(&mut cart, user.map(|u| u.id))
        .await;
    session_data::save_cart(&session, &cart).await?;
    Ok(Json((&cart).into()))
}
