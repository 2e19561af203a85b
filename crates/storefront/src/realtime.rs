//! In-process order event hub.
//!
//! Webhooks publish order and shipment changes here; the SSE endpoint
//! subscribes per order. Delivery is at-most-once: there is no replay, and
//! subscribers that fall behind the channel capacity miss events.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use threadline_core::{OrderId, OrderStatus, ShipmentStatus};

const CHANNEL_CAPACITY: usize = 256;

/// A change visible to the order's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub kind: OrderEventKind,
    pub order_status: Option<OrderStatus>,
    pub shipment_status: Option<ShipmentStatus>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    PaymentConfirmed,
    TrackingUpdated,
    StatusChanged,
}

impl OrderEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentConfirmed => "payment_confirmed",
            Self::TrackingUpdated => "tracking_updated",
            Self::StatusChanged => "status_changed",
        }
    }
}

/// Broadcast hub shared through `AppState`.
#[derive(Clone)]
pub struct OrderEvents {
    sender: broadcast::Sender<OrderEvent>,
}

impl Default for OrderEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderEvents {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: OrderEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Events for one order, skipping anything lost to lag.
    pub fn subscribe(
        &self,
        order_id: OrderId,
    ) -> impl Stream<Item = OrderEvent> + Send + use<> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(move |event| async move {
            match event {
                Ok(event) if event.order_id == order_id => Some(event),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Order event subscriber lagged");
                    None
                }
            }
        })
    }
}
