//! Order history, order detail, live order events and notifications.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use threadline_core::OrderId;

use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{CurrentUser, Notification, Order, Shipment, TrackingEvent};
use crate::routes::session_data;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Guest access to a single order.
#[derive(Debug, Default, Deserialize)]
pub struct OrderAccessQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub shipment: Option<Shipment>,
    pub tracking_events: Vec<TrackingEvent>,
}

/// Load an order the caller may see.
///
/// Owners, admins and the session that placed the order always see it;
/// anyone else must supply the email the order was placed with. Invisible
/// orders are reported as missing.
pub(crate) async fn visible_order(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
    id: OrderId,
    email: Option<&str>,
) -> Result<Order> {
    let not_found = || AppError::NotFound(format!("order {id}"));
    let order = state
        .stores()
        .orders
        .get_order(id)
        .await?
        .ok_or_else(not_found)?;

    let owner_or_admin = user.is_some_and(|u| u.is_admin() || order.user_id == Some(u.id));
    let email_matches = email.is_some_and(|e| e.trim().eq_ignore_ascii_case(&order.email));
    if owner_or_admin || email_matches || session_data::last_order(session).await? == Some(id) {
        Ok(order)
    } else {
        tracing::debug!(order_id = %id, "Order hidden from caller");
        Err(not_found())
    }
}

/// Shipment and scans for an order, if it has shipped.
pub(crate) async fn order_detail(state: &AppState, order: Order) -> Result<OrderDetail> {
    let shipments = &state.stores().shipments;
    let shipment = shipments.shipment_for_order(order.id).await?;
    let tracking_events = match &shipment {
        Some(s) => shipments.tracking_events(s.id).await?,
        None => Vec::new(),
    };
    Ok(OrderDetail {
        order,
        shipment,
        tracking_events,
    })
}

/// `GET /api/orders`
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.stores().orders.orders_for_user(user.id).await?))
}

/// `GET /api/orders/{id}`
#[instrument(skip(state, session, user, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<OrderId>,
    Query(query): Query<OrderAccessQuery>,
) -> Result<Json<OrderDetail>> {
    let order = visible_order(&state, &session, user.as_ref(), id, query.email.as_deref()).await?;
    Ok(Json(order_detail(&state, order).await?))
}

/// `GET /api/orders/{id}/events`
///
/// Live updates only: events published before the stream opened are not
/// replayed.
#[instrument(skip(state, session, user, query))]
pub async fn events(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<OrderId>,
    Query(query): Query<OrderAccessQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    visible_order(&state, &session, user.as_ref(), id, query.email.as_deref()).await?;

    let stream = state.events().subscribe(id).filter_map(|event| async move {
        match Event::default().event(event.kind.as_str()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode order event");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// `GET /api/notifications`
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn notifications(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(state.stores().notifications.for_user(user.id).await?))
}
