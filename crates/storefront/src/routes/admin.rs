//! Minimal admin endpoints: recent orders and manual status overrides.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use threadline_core::{OrderId, OrderStatus, PaymentStatus};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Order;
use crate::realtime::{OrderEvent, OrderEventKind};
use crate::state::AppState;

const RECENT_ORDERS_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOverride {
    pub status: OrderStatus,
    pub payment_status: Option<PaymentStatus>,
}

/// `GET /admin/orders`
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(
        state
            .stores()
            .orders
            .recent_orders(RECENT_ORDERS_LIMIT)
            .await?,
    ))
}

/// `POST /admin/orders/{id}/status`
#[instrument(skip(state, admin, request), fields(admin_id = %admin.id, status = %request.status))]
pub async fn set_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(request): Json<StatusOverride>,
) -> Result<Json<Order>> {
    let order = state
        .stores()
        .orders
        .set_status(id, request.status, request.payment_status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

    tracing::info!(order_id = %id, "Order status overridden");
    state.events().publish(OrderEvent {
        order_id: id,
        kind: OrderEventKind::StatusChanged,
        order_status: Some(order.status),
        shipment_status: None,
        message: format!("Order is now {}", order.status),
        occurred_at: Utc::now(),
    });

    Ok(Json(order))
}
