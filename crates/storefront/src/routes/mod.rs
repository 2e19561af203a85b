//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                                  - Home page
//! GET  /checkout/success?order=           - Order confirmation
//! GET  /orders/{id}                       - Order detail with live tracking
//! GET  /unauthorized                      - Not-authorized page
//!
//! # Auth
//! GET  /auth/login                        - Login page
//! POST /auth/login                        - Login action
//! GET  /auth/register                     - Register page
//! POST /auth/register                     - Register action
//! POST /auth/logout                       - Logout action
//!
//! # Cart / checkout / wishlist (JSON, session-backed)
//! GET|DELETE   /api/cart
//! POST         /api/cart/items
//! PATCH|DELETE /api/cart/items/{product_id}
//! GET          /api/checkout
//! POST         /api/checkout/{address,rate,review,back,payment,complete}
//! GET|POST     /api/wishlist
//! POST         /api/wishlist/refresh
//! GET|DELETE   /api/wishlist/{product_id}
//!
//! # Catalog
//! GET  /api/products?category=  /api/products/{slug}  /api/search?q=  /api/categories
//!
//! # Orders
//! GET  /api/orders  /api/orders/{id}  /api/orders/{id}/events (SSE)  /api/notifications
//!
//! # Vendor pass-throughs
//! POST /api/create-payment-intent
//! POST /api/shipping/rates
//! POST /api/shipping/label                - Admin only
//! GET  /api/shipping/track/{carrier}/{tracking}
//!
//! # Webhooks (not rate limited)
//! POST /api/webhooks/stripe
//! POST /api/shipping/webhook
//!
//! # Admin
//! GET  /admin/orders
//! POST /admin/orders/{id}/status
//! ```

pub mod admin;
pub mod api;
pub mod auth;
pub mod pages;
pub mod session_data;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::auth_rate_limiter;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::orders))
        .route("/orders/{id}/status", post(admin::set_status))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/checkout/success", get(pages::checkout_success))
        .route("/orders/{id}", get(pages::order))
        .route("/unauthorized", get(pages::unauthorized))
        .nest("/auth", auth_routes())
        .nest("/admin", admin_routes())
        .merge(api::routes())
        .merge(api::webhook_routes())
}
