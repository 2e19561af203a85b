//! Server-rendered pages: home, order confirmation, order detail and the
//! not-authorized page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use threadline_core::OrderId;

use crate::error::Result;
use crate::filters;
use crate::middleware::{CspNonce, OptionalAuth};
use crate::models::{CurrentUser, Order};
use crate::routes::api::orders::{OrderAccessQuery, OrderDetail, order_detail, visible_order};
use crate::state::AppState;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout_success.html")]
pub struct CheckoutSuccessTemplate {
    pub user: Option<CurrentUser>,
    pub order: Order,
}

/// Order detail template with live tracking updates.
#[derive(Template, WebTemplate)]
#[template(path = "order_detail.html")]
pub struct OrderDetailTemplate {
    pub user: Option<CurrentUser>,
    pub detail: OrderDetail,
    pub events_url: String,
    pub nonce: String,
}

/// Not-authorized page template.
#[derive(Template, WebTemplate)]
#[template(path = "unauthorized.html")]
pub struct UnauthorizedTemplate {
    pub user: Option<CurrentUser>,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub order: OrderId,
}

/// `GET /`
pub async fn home(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    HomeTemplate { user }
}

/// `GET /checkout/success?order=`
#[instrument(skip(state, session, user))]
pub async fn checkout_success(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<SuccessQuery>,
) -> Result<impl IntoResponse> {
    let order = visible_order(&state, &session, user.as_ref(), query.order, None).await?;
    Ok(CheckoutSuccessTemplate { user, order })
}

/// `GET /orders/{id}`
#[instrument(skip(state, session, user, nonce, query))]
pub async fn order(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    nonce: CspNonce,
    Path(id): Path<OrderId>,
    Query(query): Query<OrderAccessQuery>,
) -> Result<impl IntoResponse> {
    let order = visible_order(&state, &session, user.as_ref(), id, query.email.as_deref()).await?;
    let events_url = match query.email.as_deref() {
        Some(email) => format!(
            "/api/orders/{id}/events?{}",
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("email", email)
                .finish()
        ),
        None => format!("/api/orders/{id}/events"),
    };
    Ok(OrderDetailTemplate {
        user,
        detail: order_detail(&state, order).await?,
        events_url,
        nonce: nonce.0,
    })
}

/// `GET /unauthorized`
pub async fn unauthorized(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    (StatusCode::FORBIDDEN, UnauthorizedTemplate { user })
}
