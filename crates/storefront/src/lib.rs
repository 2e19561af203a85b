//! Threadline storefront library.
//!
//! Cart, checkout, wishlist, order tracking and the vendor webhooks behind
//! the Threadline shop. The binary in `main.rs` only loads config, wires
//! logging and serves [`app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod shipping;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, middleware as axum_middleware, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use state::AppState;

/// Directory served under `/static`.
pub const STATIC_DIR: &str = "crates/storefront/static";

/// Build the full application router.
///
/// Sessions use Postgres when the state has a pool and the in-memory store
/// otherwise.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR));

    let router = match state.pool() {
        Some(pool) => router.layer(middleware::create_session_layer(
            middleware::postgres_store(pool),
            state.config(),
        )),
        None => router.layer(middleware::create_session_layer(
            tower_sessions::MemoryStore::default(),
            state.config(),
        )),
    };

    router
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::csp_nonce_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
