//! Persistence for the storefront.
//!
//! # Tables (schema `storefront`)
//!
//! - `users`, `user_passwords` - Accounts and Argon2 hashes
//! - `saved_addresses` - Last-used shipping address per user
//! - `cart_items` - Mirrored carts of signed-in users
//! - `wishlist_items` - One row per (user, product)
//! - `orders` - Placed orders, unique on `payment_intent_id`
//! - `shipments`, `tracking_events` - Fulfilment and carrier scans
//! - `notifications` - In-app order notifications
//! - `orphaned_payments` - Captured payments whose order insert failed
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Stores
//!
//! Each table group sits behind an `async_trait` store trait so services can
//! run against Postgres in production and [`memory::MemoryStore`] in tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p threadline-cli -- migrate
//! ```

pub mod addresses;
pub mod carts;
pub mod memory;
pub mod notifications;
pub mod orders;
pub mod shipments;
pub mod users;
pub mod wishlists;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use threadline_core::{
    CartItem, Email, OrderId, OrderStatus, PaymentStatus, ProductId, ShipmentId, ShipmentStatus,
    ShippingAddress, UserId, UserRole, WishlistItem,
};

use crate::models::{
    NewNotification, NewOrder, NewShipment, NewTrackingEvent, Notification, Order, OrderInsert,
    OrphanedPayment, PaymentConfirmation, Shipment, TrackingEvent, User,
};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Store is temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Parse a `TEXT` status column.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column} in database: {e}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Store traits
// =============================================================================

/// Mirrored cart lines of signed-in users.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// All lines for the user.
    async fn load(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError>;

    /// Insert the line or overwrite it (quantity is absolute).
    async fn upsert_item(&self, user_id: UserId, item: &CartItem) -> Result<(), RepositoryError>;

    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<(), RepositoryError>;

    /// Replace every line for the user.
    async fn replace(&self, user_id: UserId, items: &[CartItem]) -> Result<(), RepositoryError>;

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError>;
}

/// Saved products per user.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistItem>, RepositoryError>;

    /// Insert unless the product is already saved.
    async fn add(&self, user_id: UserId, item: &WishlistItem) -> Result<(), RepositoryError>;

    /// Returns `true` if a row was removed.
    async fn remove(&self, user_id: UserId, product_id: &ProductId)
    -> Result<bool, RepositoryError>;
}

/// Orders and orphaned payments.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order, or return the existing one for the same payment
    /// intent.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn order_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Newest first.
    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError>;

    /// Overwrite the order status (and payment status when given).
    async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Mark the order for a payment intent completed and paid, but only
    /// while its status still awaits payment.
    async fn confirm_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError>;

    /// Record (or refresh) an orphaned payment.
    async fn record_orphaned_payment(
        &self,
        orphan: &OrphanedPayment,
    ) -> Result<(), RepositoryError>;

    /// Orphaned payments that still have no order, newest first.
    async fn orphaned_payments(&self) -> Result<Vec<OrphanedPayment>, RepositoryError>;
}

/// Shipments and tracking events.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Insert the shipment for an order, or return the existing one.
    async fn create_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError>;

    async fn shipment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError>;

    async fn find_by_tracking(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<Shipment>, RepositoryError>;

    async fn update_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Option<Shipment>, RepositoryError>;

    async fn add_tracking_event(
        &self,
        event: &NewTrackingEvent,
    ) -> Result<TrackingEvent, RepositoryError>;

    /// Oldest first.
    async fn tracking_events(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<TrackingEvent>, RepositoryError>;
}

/// In-app notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn add(&self, notification: &NewNotification) -> Result<Notification, RepositoryError>;

    /// Newest first.
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError>;
}

/// Accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `Conflict` if the email is taken.
    async fn create_with_password(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// The user and their password hash, if both exist.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    async fn set_role(&self, email: &Email, role: UserRole)
    -> Result<Option<User>, RepositoryError>;
}

/// Last-used shipping address per user.
#[async_trait]
pub trait AddressStore: Send + Sync {
    async fn saved_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, RepositoryError>;

    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<(), RepositoryError>;
}

/// Every store the storefront uses.
#[derive(Clone)]
pub struct Stores {
    pub carts: Arc<dyn CartStore>,
    pub wishlists: Arc<dyn WishlistStore>,
    pub orders: Arc<dyn OrderStore>,
    pub shipments: Arc<dyn ShipmentStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserStore>,
    pub addresses: Arc<dyn AddressStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            carts: Arc::new(carts::PgCartStore::new(pool.clone())),
            wishlists: Arc::new(wishlists::PgWishlistStore::new(pool.clone())),
            orders: Arc::new(orders::PgOrderStore::new(pool.clone())),
            shipments: Arc::new(shipments::PgShipmentStore::new(pool.clone())),
            notifications: Arc::new(notifications::PgNotificationStore::new(pool.clone())),
            users: Arc::new(users::PgUserStore::new(pool.clone())),
            addresses: Arc::new(addresses::PgAddressStore::new(pool.clone())),
        }
    }

    /// All stores backed by one shared in-memory store.
    #[must_use]
    pub fn in_memory() -> (Self, Arc<memory::MemoryStore>) {
        let store = Arc::new(memory::MemoryStore::new());
        let stores = Self {
            carts: store.clone(),
            wishlists: store.clone(),
            orders: store.clone(),
            shipments: store.clone(),
            notifications: store.clone(),
            users: store.clone(),
            addresses: store.clone(),
        };
        (stores, store)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_reports_corruption() {
        let err = parse_column::<OrderStatus>("teleported", "orders.status").unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
        assert!(err.to_string().contains("orders.status"));
    }
}
