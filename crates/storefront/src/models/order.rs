//! Order, shipment and notification domain types.
//!
//! These are validated domain objects; the row types that map onto tables
//! live next to the queries in `db`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use threadline_core::{
    CartItem, OrderId, OrderStatus, PaymentStatus, ShipmentId, ShipmentStatus, ShippingAddress,
    ShippingRate, UserId,
};

/// The rate the shopper picked, stored on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub rate_id: String,
    pub provider: String,
    pub service: String,
    pub price: Decimal,
    pub estimated_days: Option<u32>,
}

impl From<&ShippingRate> for ShippingDetails {
    fn from(rate: &ShippingRate) -> Self {
        Self {
            rate_id: rate.id.clone(),
            provider: rate.provider.clone(),
            service: rate.service.clone(),
            price: rate.price,
            estimated_days: rate.estimated_days,
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub payment_intent_id: String,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub shipping_details: ShippingDetails,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub email: String,
    pub guest_mode: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub payment_intent_id: String,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub shipping_details: ShippingDetails,
    pub tracking_number: Option<String>,
    pub label_url: Option<String>,
    pub email: String,
}

impl NewOrder {
    /// Guest orders have no owning user.
    #[must_use]
    pub const fn guest_mode(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Result of an idempotent order insert.
#[derive(Debug, Clone)]
pub struct OrderInsert {
    pub order: Order,
    /// `false` when an order for the payment intent already existed.
    pub created: bool,
}

/// What a processor payment confirmation did to the matching order.
#[derive(Debug, Clone)]
pub enum PaymentConfirmation {
    /// The order was waiting on payment and is now completed and paid.
    Confirmed(Order),
    /// The order had already moved on and was left as it was.
    AlreadySettled(Order),
    /// No order carries the payment intent.
    NoOrder,
}

/// A parcel shipped for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub rate_id: String,
    pub status: ShipmentStatus,
    pub label_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub rate_id: String,
    pub status: ShipmentStatus,
    pub label_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// One carrier scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingEvent {
    pub id: i64,
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub status_details: String,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTrackingEvent {
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub status_details: String,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// In-app notification shown to the order owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub order_id: OrderId,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<UserId>,
    pub order_id: OrderId,
    pub kind: String,
    pub message: String,
}

/// A captured payment with no order behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedPayment {
    pub payment_intent_id: String,
    pub amount: Decimal,
    pub email: Option<String>,
    pub error: String,
    pub created_at: DateTime<Utc>,
}
