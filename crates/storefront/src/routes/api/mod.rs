//! JSON API consumed by the storefront frontend.
//!
//! Webhook receivers are mounted outside the rate limiter; vendors retry on
//! non-2xx and must never be throttled.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod shipping;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::middleware::api_rate_limiter;
use crate::state::AppState;

fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{product_id}",
            patch(cart::update_quantity).delete(cart::remove_item),
        )
}

fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/address", post(checkout::submit_address))
        .route("/rate", post(checkout::select_rate))
        .route("/review", post(checkout::continue_to_review))
        .route("/back", post(checkout::back))
        .route("/payment", post(checkout::continue_to_payment))
        .route("/complete", post(checkout::complete))
}

fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show).post(wishlist::add))
        .route("/refresh", post(wishlist::refresh))
        .route(
            "/{product_id}",
            get(wishlist::contains).delete(wishlist::remove),
        )
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list))
        .route("/{id}", get(orders::show))
        .route("/{id}/events", get(orders::events))
}

fn shipping_routes() -> Router<AppState> {
    Router::new()
        .route("/rates", post(shipping::rates))
        .route("/label", post(shipping::label))
        .route("/track/{carrier}/{tracking}", get(shipping::track))
}

/// Vendor callbacks, exempt from rate limiting.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/stripe", post(payments::webhook))
        .route("/api/shipping/webhook", post(shipping::webhook))
}

/// All rate-limited `/api` routes.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/orders", order_routes())
        .nest("/shipping", shipping_routes())
        .route("/notifications", get(orders::notifications))
        .route("/create-payment-intent", post(payments::create_payment_intent))
        .route("/products", get(catalog::list_products))
        .route("/products/{slug}", get(catalog::product))
        .route("/search", get(catalog::search))
        .route("/categories", get(catalog::categories))
        .layer(api_rate_limiter());

    Router::new().nest("/api", api)
}
