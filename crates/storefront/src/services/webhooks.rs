//! Payment and shipping webhook handling.
//!
//! Both handlers verify the signature over the raw body before parsing it.
//! Signature and payload problems answer 400; store failures answer 500 so
//! the sender redelivers. Every write is guarded or keyed, so a redelivered
//! event leaves the same state behind. A payment confirmation only moves an
//! order that still awaits payment, never one that has shipped or arrived.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use threadline_core::{OrderStatus, ShipmentStatus};

use crate::db::{RepositoryError, Stores};
use crate::models::{NewNotification, NewTrackingEvent, PaymentConfirmation};
use crate::payments::webhook::{
    self as payment_webhook, Event, PAYMENT_INTENT_SUCCEEDED, SIGNATURE_TOLERANCE_SECS,
    SignatureError,
};
use crate::realtime::{OrderEvent, OrderEventKind, OrderEvents};
use crate::shipping::webhook::{self as shipping_webhook, TRACK_UPDATED, WebhookPayload};

/// Errors from webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

impl WebhookError {
    /// `true` for problems with the request itself (answered with 400).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Repository(_))
    }
}

/// What a delivered event led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State was written.
    Applied,
    /// The event type is not one we act on.
    Ignored,
    /// Nothing in the store matched the event.
    Unmatched,
    /// The matching record had already moved past what the event sets.
    Stale,
}

/// Webhook handling for one request.
pub struct WebhookService<'a> {
    stores: &'a Stores,
    events: &'a OrderEvents,
}

impl<'a> WebhookService<'a> {
    #[must_use]
    pub const fn new(stores: &'a Stores, events: &'a OrderEvents) -> Self {
        Self { stores, events }
    }

    /// Handle a payment processor event.
    ///
    /// # Errors
    ///
    /// Returns a client error for a bad signature or body, and `Repository`
    /// if the order update fails.
    #[instrument(skip(self, payload, signature, secret))]
    pub async fn handle_payment_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        secret: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        payment_webhook::verify_signature(
            payload,
            signature,
            secret,
            Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )?;

        let event: Event = serde_json::from_slice(payload)?;
        if event.event_type != PAYMENT_INTENT_SUCCEEDED {
            info!(event_id = %event.id, event_type = %event.event_type, "Ignoring payment event");
            return Ok(WebhookOutcome::Ignored);
        }
        let Some(payment_intent_id) = event.payment_intent_id() else {
            warn!(event_id = %event.id, "Payment event carries no payment intent");
            return Ok(WebhookOutcome::Ignored);
        };

        let order = match self.stores.orders.confirm_payment(payment_intent_id).await? {
            PaymentConfirmation::Confirmed(order) => order,
            PaymentConfirmation::AlreadySettled(order) => {
                info!(
                    order_id = %order.id,
                    status = %order.status,
                    "Order already past payment; leaving it as is"
                );
                return Ok(WebhookOutcome::Stale);
            }
            PaymentConfirmation::NoOrder => {
                warn!(
                    payment_intent_id,
                    "Payment succeeded with no matching order; needs reconciliation"
                );
                return Ok(WebhookOutcome::Unmatched);
            }
        };

        info!(order_id = %order.id, payment_intent_id, "Order payment confirmed");
        self.events.publish(OrderEvent {
            order_id: order.id,
            kind: OrderEventKind::PaymentConfirmed,
            order_status: Some(order.status),
            shipment_status: None,
            message: "Payment confirmed".to_owned(),
            occurred_at: Utc::now(),
        });
        Ok(WebhookOutcome::Applied)
    }

    /// Handle a shipping aggregator event.
    ///
    /// # Errors
    ///
    /// Returns a client error for a bad signature or body, and `Repository`
    /// if any write fails.
    #[instrument(skip(self, payload, signature, secret))]
    pub async fn handle_shipping_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        secret: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        if !shipping_webhook::verify_signature(payload, signature, secret) {
            return Err(SignatureError::Mismatch.into());
        }

        let body: WebhookPayload = serde_json::from_slice(payload)?;
        if body.event != TRACK_UPDATED {
            info!(event = %body.event, "Ignoring shipping event");
            return Ok(WebhookOutcome::Ignored);
        }

        let track = body.data;
        let Some(shipment) = self
            .stores
            .shipments
            .find_by_tracking(&track.tracking_number, &track.carrier)
            .await?
        else {
            warn!(
                tracking_number = %track.tracking_number,
                carrier = %track.carrier,
                "Tracking update for unknown shipment"
            );
            return Ok(WebhookOutcome::Unmatched);
        };

        let latest = track.tracking_status.as_ref();
        let status = latest.map_or(ShipmentStatus::Unknown, |s| {
            ShipmentStatus::from_tracking(&s.status)
        });
        let details = latest
            .map(|s| s.status_details.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| status.to_string());

        self.stores
            .shipments
            .update_status(shipment.id, status, track.eta)
            .await?;
        self.stores
            .shipments
            .add_tracking_event(&NewTrackingEvent {
                shipment_id: shipment.id,
                status,
                status_details: details.clone(),
                location: latest
                    .and_then(|s| s.location.as_ref())
                    .and_then(|l| l.display()),
                occurred_at: latest.and_then(|s| s.status_date).unwrap_or_else(Utc::now),
            })
            .await?;

        let order = self.stores.orders.get_order(shipment.order_id).await?;
        self.stores
            .notifications
            .add(&NewNotification {
                user_id: order.as_ref().and_then(|o| o.user_id),
                order_id: shipment.order_id,
                kind: OrderEventKind::TrackingUpdated.as_str().to_owned(),
                message: details.clone(),
            })
            .await?;

        let mut order_status = order.map(|o| o.status);
        if status == ShipmentStatus::Delivered {
            let delivered = self
                .stores
                .orders
                .set_status(shipment.order_id, OrderStatus::Delivered, None)
                .await?;
            order_status = delivered.map(|o| o.status);
        }

        info!(
            order_id = %shipment.order_id,
            shipment_status = %status,
            "Shipment tracking updated"
        );
        self.events.publish(OrderEvent {
            order_id: shipment.order_id,
            kind: OrderEventKind::TrackingUpdated,
            order_status,
            shipment_status: Some(status),
            message: details,
            occurred_at: Utc::now(),
        });
        Ok(WebhookOutcome::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;
    use rust_decimal::Decimal;
    use serde_json::json;

    use threadline_core::{CartItem, PaymentStatus, ProductId, ShippingAddress, UserId};

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{NotificationStore, OrderStore, ShipmentStore};
    use crate::models::{NewOrder, NewShipment, Order, ShippingDetails};

    const STRIPE_SECRET: &str = "whsec_test";
    const SHIPPO_SECRET: &str = "shippo_test";

    async fn seed_order(memory: &MemoryStore, user: Option<UserId>) -> Order {
        let order = NewOrder {
            user_id: user,
            payment_intent_id: "pi_123".to_owned(),
            subtotal: Decimal::from(100),
            shipping_cost: Decimal::from(5),
            tax: Decimal::from(5),
            total: Decimal::from(110),
            currency: "usd".to_owned(),
            status: OrderStatus::Processing,
            payment_status: PaymentStatus::Paid,
            items: vec![CartItem {
                product_id: ProductId::new("tee"),
                name: "Tee".to_owned(),
                price: Decimal::from(100),
                quantity: 1,
                size: None,
                image: None,
                description: None,
                color: None,
                weight: None,
            }],
            shipping_address: ShippingAddress {
                name: "Ada".to_owned(),
                street1: "12 Engine Row".to_owned(),
                street2: None,
                city: "London".to_owned(),
                state: "LN".to_owned(),
                postal_code: "N1 9GU".to_owned(),
                country: "GB".to_owned(),
                phone: "020 7946 0000".to_owned(),
                email: "ada@example.com".to_owned(),
            },
            shipping_details: ShippingDetails {
                rate_id: "rate_1".to_owned(),
                provider: "USPS".to_owned(),
                service: "Priority".to_owned(),
                price: Decimal::from(5),
                estimated_days: Some(2),
            },
            tracking_number: Some("9400111".to_owned()),
            label_url: None,
            email: "ada@example.com".to_owned(),
        };
        let order = memory.create_order(&order).await.unwrap().order;
        memory
            .create_shipment(&NewShipment {
                order_id: order.id,
                carrier: "USPS".to_owned(),
                tracking_number: Some("9400111".to_owned()),
                rate_id: "rate_1".to_owned(),
                status: ShipmentStatus::PreTransit,
                label_url: None,
                estimated_delivery: None,
            })
            .await
            .unwrap();
        order
    }

    fn payment_body(event_type: &str, intent: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": { "id": intent, "object": "payment_intent" } }
        }))
        .unwrap()
    }

    fn tracking_body(status: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "track_updated",
            "test": true,
            "data": {
                "carrier": "usps",
                "tracking_number": "9400111",
                "eta": "2026-03-05T18:00:00Z",
                "tracking_status": {
                    "status": status,
                    "status_details": "Your package is moving",
                    "status_date": "2026-03-03T09:30:00Z",
                    "location": { "city": "Memphis", "state": "TN", "country": "US" }
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_payment_succeeded_completes_order_and_publishes() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let mut stream = Box::pin(events.subscribe(order.id));
        let service = WebhookService::new(&stores, &events);

        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_123");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());
        let outcome = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied);
        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, OrderEventKind::PaymentConfirmed);
    }

    #[tokio::test]
    async fn test_payment_replay_is_harmless() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);

        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_123");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            outcomes.push(
                service
                    .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(outcomes, [WebhookOutcome::Applied, WebhookOutcome::Stale]);
        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(memory.all_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_for_unknown_intent_is_unmatched() {
        let (stores, _memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let service = WebhookService::new(&stores, &events);

        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_missing");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());
        let outcome = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Unmatched);
    }

    #[tokio::test]
    async fn test_other_payment_events_are_ignored() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);

        let body = payment_body("payment_intent.payment_failed", "pi_123");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());
        let outcome = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_bad_payment_signature_is_client_error() {
        let (stores, _memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let service = WebhookService::new(&stores, &events);
        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_123");
        let header = payment_webhook::sign_payload(&body, "wrong", Utc::now().timestamp());

        let err = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap_err();
        assert!(err.is_client_error());

        let err = service
            .handle_payment_event(&body, None, STRIPE_SECRET)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingSignature));
    }

    #[tokio::test]
    async fn test_payment_store_failure_is_server_error() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);
        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_123");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());

        memory.fail_next_writes(1);
        let err = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap_err();
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_tracking_update_records_event_and_notification() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let user = UserId::generate();
        let order = seed_order(&memory, Some(user)).await;
        let mut stream = Box::pin(events.subscribe(order.id));
        let service = WebhookService::new(&stores, &events);

        let body = tracking_body("TRANSIT");
        let signature = shipping_webhook::sign_payload(&body, SHIPPO_SECRET);
        let outcome = service
            .handle_shipping_event(&body, Some(&signature), SHIPPO_SECRET)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied);

        let shipment = memory.shipment_for_order(order.id).await.unwrap().unwrap();
        assert_eq!(shipment.status, ShipmentStatus::Transit);
        assert!(shipment.estimated_delivery.is_some());

        let tracking = memory.tracking_events(shipment.id).await.unwrap();
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].location.as_deref(), Some("Memphis, TN, US"));

        let notes = memory.for_user(user).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "Your package is moving");

        let event = stream.next().await.unwrap();
        assert_eq!(event.shipment_status, Some(ShipmentStatus::Transit));
        assert_eq!(event.order_status, Some(OrderStatus::Processing));
    }

    #[tokio::test]
    async fn test_delivered_marks_order_delivered() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);

        let body = tracking_body("DELIVERED");
        let signature = shipping_webhook::sign_payload(&body, SHIPPO_SECRET);
        service
            .handle_shipping_event(&body, Some(&format!("v1={signature}")), SHIPPO_SECRET)
            .await
            .unwrap();

        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_late_payment_event_keeps_delivered_order() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);

        let body = tracking_body("DELIVERED");
        let signature = shipping_webhook::sign_payload(&body, SHIPPO_SECRET);
        service
            .handle_shipping_event(&body, Some(&signature), SHIPPO_SECRET)
            .await
            .unwrap();

        let mut stream = Box::pin(events.subscribe(order.id));
        let body = payment_body(PAYMENT_INTENT_SUCCEEDED, "pi_123");
        let header = payment_webhook::sign_payload(&body, STRIPE_SECRET, Utc::now().timestamp());
        let outcome = service
            .handle_payment_event(&body, Some(&header), STRIPE_SECRET)
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Stale);
        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        events.publish(OrderEvent {
            order_id: order.id,
            kind: OrderEventKind::TrackingUpdated,
            order_status: None,
            shipment_status: None,
            message: "marker".to_owned(),
            occurred_at: Utc::now(),
        });
        let next = stream.next().await.unwrap();
        assert_eq!(next.message, "marker");
    }

    #[tokio::test]
    async fn test_unsigned_tracking_update_is_rejected() {
        let (stores, memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let order = seed_order(&memory, None).await;
        let service = WebhookService::new(&stores, &events);
        let body = tracking_body("DELIVERED");

        let err = service
            .handle_shipping_event(&body, Some("deadbeef"), SHIPPO_SECRET)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::InvalidSignature(SignatureError::Mismatch)
        ));

        let stored = memory.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_tracking_for_unknown_shipment_is_unmatched() {
        let (stores, _memory) = Stores::in_memory();
        let events = OrderEvents::new();
        let service = WebhookService::new(&stores, &events);
        let body = tracking_body("TRANSIT");
        let signature = shipping_webhook::sign_payload(&body, SHIPPO_SECRET);

        let outcome = service
            .handle_shipping_event(&body, Some(&signature), SHIPPO_SECRET)
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Unmatched);
    }
}
