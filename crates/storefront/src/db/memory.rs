//! In-memory implementation of every store trait.
//!
//! Backs the unit and integration test suites. Semantics match the Postgres
//! stores, including idempotent order and shipment inserts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use threadline_core::{
    CartItem, Email, OrderId, OrderStatus, PaymentStatus, ProductId, ShipmentId, ShipmentStatus,
    ShippingAddress, UserId, UserRole, WishlistItem,
};

use super::{
    AddressStore, CartStore, NotificationStore, OrderStore, RepositoryError, ShipmentStore,
    UserStore, WishlistStore,
};
use crate::models::{
    NewNotification, NewOrder, NewShipment, NewTrackingEvent, Notification, Order, OrderInsert,
    OrphanedPayment, PaymentConfirmation, Shipment, TrackingEvent, User,
};

#[derive(Default)]
struct State {
    carts: HashMap<UserId, Vec<CartItem>>,
    wishlists: HashMap<UserId, Vec<WishlistItem>>,
    orders: Vec<Order>,
    orphans: HashMap<String, OrphanedPayment>,
    shipments: Vec<Shipment>,
    tracking_events: Vec<TrackingEvent>,
    notifications: Vec<Notification>,
    users: HashMap<UserId, (User, String)>,
    addresses: HashMap<UserId, ShippingAddress>,
    next_serial: i64,
}

impl State {
    fn next_serial(&mut self) -> i64 {
        self.next_serial += 1;
        self.next_serial
    }
}

/// Store backed by a single `RwLock`-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with `RepositoryError::Unavailable`.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), RepositoryError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(RepositoryError::Unavailable("injected failure".to_owned()));
        }
        Ok(())
    }

    /// Snapshot of every order, oldest first.
    pub async fn all_orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_item(&self, user_id: UserId, item: &CartItem) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let lines = state.carts.entry(user_id).or_default();
        match lines.iter_mut().find(|l| l.product_id == item.product_id) {
            Some(line) => *line = item.clone(),
            None => lines.push(item.clone()),
        }
        Ok(())
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<(), RepositoryError> {
        self.check_write()?;
        if let Some(lines) = self.state.write().await.carts.get_mut(&user_id) {
            lines.retain(|l| &l.product_id != product_id);
        }
        Ok(())
    }

    async fn replace(&self, user_id: UserId, items: &[CartItem]) -> Result<(), RepositoryError> {
        self.check_write()?;
        self.state
            .write()
            .await
            .carts
            .insert(user_id, items.to_vec());
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.check_write()?;
        self.state.write().await.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistItem>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .wishlists
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add(&self, user_id: UserId, item: &WishlistItem) -> Result<(), RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let items = state.wishlists.entry(user_id).or_default();
        if !items.iter().any(|i| i.product_id == item.product_id) {
            items.push(item.clone());
        }
        Ok(())
    }

    async fn remove(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(items) = state.wishlists.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = items.len();
        items.retain(|i| &i.product_id != product_id);
        Ok(items.len() != before)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .orders
            .iter()
            .find(|o| o.payment_intent_id == order.payment_intent_id)
        {
            return Ok(OrderInsert {
                order: existing.clone(),
                created: false,
            });
        }

        let now = Utc::now();
        let created = Order {
            id: OrderId::generate(),
            user_id: order.user_id,
            payment_intent_id: order.payment_intent_id.clone(),
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            tax: order.tax,
            total: order.total,
            currency: order.currency.clone(),
            status: order.status,
            payment_status: order.payment_status,
            items: order.items.clone(),
            shipping_address: order.shipping_address.clone(),
            shipping_details: order.shipping_details.clone(),
            tracking_number: order.tracking_number.clone(),
            label_url: order.label_url.clone(),
            email: order.email.clone(),
            guest_mode: order.guest_mode(),
            created_at: now,
            updated_at: now,
        };
        state.orders.push(created.clone());

        Ok(OrderInsert {
            order: created,
            created: true,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn order_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.read().await;
        Ok(state.orders.iter().rev().take(limit).cloned().collect())
    }

    async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Option<Order>, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        Ok(state.orders.iter_mut().find(|o| o.id == id).map(|order| {
            order.status = status;
            if let Some(payment_status) = payment_status {
                order.payment_status = payment_status;
            }
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn confirm_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(order) = state
            .orders
            .iter_mut()
            .find(|o| o.payment_intent_id == payment_intent_id)
        else {
            return Ok(PaymentConfirmation::NoOrder);
        };
        if !order.status.awaits_payment() {
            return Ok(PaymentConfirmation::AlreadySettled(order.clone()));
        }
        order.status = OrderStatus::Completed;
        order.payment_status = PaymentStatus::Paid;
        order.updated_at = Utc::now();
        Ok(PaymentConfirmation::Confirmed(order.clone()))
    }

    async fn record_orphaned_payment(
        &self,
        orphan: &OrphanedPayment,
    ) -> Result<(), RepositoryError> {
        self.state
            .write()
            .await
            .orphans
            .insert(orphan.payment_intent_id.clone(), orphan.clone());
        Ok(())
    }

    async fn orphaned_payments(&self) -> Result<Vec<OrphanedPayment>, RepositoryError> {
        let state = self.state.read().await;
        let mut orphans: Vec<OrphanedPayment> = state
            .orphans
            .values()
            .filter(|p| {
                !state
                    .orders
                    .iter()
                    .any(|o| o.payment_intent_id == p.payment_intent_id)
            })
            .cloned()
            .collect();
        orphans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orphans)
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn create_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .shipments
            .iter()
            .find(|s| s.order_id == shipment.order_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let created = Shipment {
            id: ShipmentId::generate(),
            order_id: shipment.order_id,
            carrier: shipment.carrier.clone(),
            tracking_number: shipment.tracking_number.clone(),
            rate_id: shipment.rate_id.clone(),
            status: shipment.status,
            label_url: shipment.label_url.clone(),
            estimated_delivery: shipment.estimated_delivery,
            created_at: now,
            updated_at: now,
        };
        state.shipments.push(created.clone());
        Ok(created)
    }

    async fn shipment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .shipments
            .iter()
            .find(|s| s.order_id == order_id)
            .cloned())
    }

    async fn find_by_tracking(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .shipments
            .iter()
            .find(|s| {
                s.tracking_number.as_deref() == Some(tracking_number)
                    && s.carrier.eq_ignore_ascii_case(carrier)
            })
            .cloned())
    }

    async fn update_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Option<Shipment>, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        Ok(state.shipments.iter_mut().find(|s| s.id == id).map(|shipment| {
            shipment.status = status;
            if estimated_delivery.is_some() {
                shipment.estimated_delivery = estimated_delivery;
            }
            shipment.updated_at = Utc::now();
            shipment.clone()
        }))
    }

    async fn add_tracking_event(
        &self,
        event: &NewTrackingEvent,
    ) -> Result<TrackingEvent, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let created = TrackingEvent {
            id: state.next_serial(),
            shipment_id: event.shipment_id,
            status: event.status,
            status_details: event.status_details.clone(),
            location: event.location.clone(),
            occurred_at: event.occurred_at,
        };
        state.tracking_events.push(created.clone());
        Ok(created)
    }

    async fn tracking_events(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<TrackingEvent>, RepositoryError> {
        let state = self.state.read().await;
        let mut events: Vec<TrackingEvent> = state
            .tracking_events
            .iter()
            .filter(|e| e.shipment_id == shipment_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.occurred_at, e.id));
        Ok(events)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn add(&self, notification: &NewNotification) -> Result<Notification, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let created = Notification {
            id: state.next_serial(),
            user_id: notification.user_id,
            order_id: notification.order_id,
            kind: notification.kind.clone(),
            message: notification.message.clone(),
            created_at: Utc::now(),
        };
        state.notifications.push(created.clone());
        Ok(created)
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == Some(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_with_password(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if state.users.values().any(|(u, _)| &u.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let user = User {
            id: UserId::generate(),
            email: email.clone(),
            role: UserRole::Customer,
            created_at: Utc::now(),
        };
        state
            .users
            .insert(user.id, (user.clone(), password_hash.to_owned()));
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|(u, _)| &u.email == email).cloned())
    }

    async fn set_role(
        &self,
        email: &Email,
        role: UserRole,
    ) -> Result<Option<User>, RepositoryError> {
        self.check_write()?;
        let mut state = self.state.write().await;
        Ok(state
            .users
            .values_mut()
            .find(|entry| &entry.0.email == email)
            .map(|(user, _)| {
                user.role = role;
                user.clone()
            }))
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn saved_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, RepositoryError> {
        Ok(self.state.read().await.addresses.get(&user_id).cloned())
    }

    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<(), RepositoryError> {
        self.check_write()?;
        self.state
            .write()
            .await
            .addresses
            .insert(user_id, address.clone());
        Ok(())
    }
}
