//! Order repository.
//!
//! Orders are unique on `payment_intent_id`, which makes order creation
//! idempotent: a retried checkout or a webhook that races the browser gets
//! the existing row back instead of a duplicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use threadline_core::{CartItem, OrderId, OrderStatus, PaymentStatus, ShippingAddress, UserId};

use super::{OrderStore, RepositoryError, parse_column};
use crate::models::{
    NewOrder, Order, OrderInsert, OrphanedPayment, PaymentConfirmation, ShippingDetails,
};

const ORDER_COLUMNS: &str = "id, user_id, payment_intent_id, subtotal, shipping_cost, tax, total, \
     currency, status, payment_status, items, shipping_address, shipping_details, \
     tracking_number, label_url, email, guest_mode, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<Uuid>,
    payment_intent_id: String,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    status: String,
    payment_status: String,
    items: Json<Vec<CartItem>>,
    shipping_address: Json<ShippingAddress>,
    shipping_details: Json<ShippingDetails>,
    tracking_number: Option<String>,
    label_url: Option<String>,
    email: String,
    guest_mode: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            payment_intent_id: row.payment_intent_id,
            subtotal: row.subtotal,
            shipping_cost: row.shipping_cost,
            tax: row.tax,
            total: row.total,
            currency: row.currency,
            status: parse_column(&row.status, "orders.status")?,
            payment_status: parse_column(&row.payment_status, "orders.payment_status")?,
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            shipping_details: row.shipping_details.0,
            tracking_number: row.tracking_number,
            label_url: row.label_url,
            email: row.email,
            guest_mode: row.guest_mode,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrphanRow {
    payment_intent_id: String,
    amount: Decimal,
    email: Option<String>,
    error: String,
    created_at: DateTime<Utc>,
}

impl From<OrphanRow> for OrphanedPayment {
    fn from(row: OrphanRow) -> Self {
        Self {
            payment_intent_id: row.payment_intent_id,
            amount: row.amount,
            email: row.email,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed [`OrderStore`].
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_optional(
        &self,
        filter: &str,
        bind: impl for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + 'static,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE {filter}");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO storefront.orders
                (id, user_id, payment_intent_id, subtotal, shipping_cost, tax, total,
                 currency, status, payment_status, items, shipping_address, shipping_details,
                 tracking_number, label_url, email, guest_mode)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (payment_intent_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        );

        let inserted = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(order.user_id)
            .bind(&order.payment_intent_id)
            .bind(order.subtotal)
            .bind(order.shipping_cost)
            .bind(order.tax)
            .bind(order.total)
            .bind(&order.currency)
            .bind(order.status.as_str())
            .bind(order.payment_status.as_str())
            .bind(Json(&order.items))
            .bind(Json(&order.shipping_address))
            .bind(Json(&order.shipping_details))
            .bind(&order.tracking_number)
            .bind(&order.label_url)
            .bind(&order.email)
            .bind(order.guest_mode())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok(OrderInsert {
                order: Order::try_from(row)?,
                created: true,
            });
        }

        let existing = self
            .order_by_payment_intent(&order.payment_intent_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(OrderInsert {
            order: existing,
            created: false,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.fetch_optional("id = $1", id).await
    }

    async fn order_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.fetch_optional("payment_intent_id = $1", payment_intent_id.to_owned())
            .await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE user_id = $1 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders ORDER BY created_at DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.orders
            SET status = $2,
                payment_status = COALESCE($3, payment_status),
                updated_at = now()
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(payment_status.map(|p| p.as_str()))
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn confirm_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentConfirmation, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.orders
            SET status = $2, payment_status = $3, updated_at = now()
            WHERE payment_intent_id = $1 AND status IN ($4, $5)
            RETURNING {ORDER_COLUMNS}
            "
        );
        let confirmed = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(payment_intent_id)
            .bind(OrderStatus::Completed.as_str())
            .bind(PaymentStatus::Paid.as_str())
            .bind(OrderStatus::Pending.as_str())
            .bind(OrderStatus::Processing.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()?;

        if let Some(order) = confirmed {
            return Ok(PaymentConfirmation::Confirmed(order));
        }
        Ok(match self.order_by_payment_intent(payment_intent_id).await? {
            Some(order) => PaymentConfirmation::AlreadySettled(order),
            None => PaymentConfirmation::NoOrder,
        })
    }

    async fn record_orphaned_payment(
        &self,
        orphan: &OrphanedPayment,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.orphaned_payments
                (payment_intent_id, amount, email, error, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (payment_intent_id)
            DO UPDATE SET amount = EXCLUDED.amount,
                          email = EXCLUDED.email,
                          error = EXCLUDED.error
            ",
        )
        .bind(&orphan.payment_intent_id)
        .bind(orphan.amount)
        .bind(&orphan.email)
        .bind(&orphan.error)
        .bind(orphan.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn orphaned_payments(&self) -> Result<Vec<OrphanedPayment>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrphanRow>(
            r"
            SELECT p.payment_intent_id, p.amount, p.email, p.error, p.created_at
            FROM storefront.orphaned_payments p
            WHERE NOT EXISTS (
                SELECT 1 FROM storefront.orders o
                WHERE o.payment_intent_id = p.payment_intent_id
            )
            ORDER BY p.created_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(OrphanedPayment::from).collect())
    }
}
