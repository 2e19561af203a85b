//! Mirrored carts of signed-in users.
//!
//! The session cart is authoritative for the shopper; these rows are a
//! best-effort copy so the cart follows the account across devices.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use threadline_core::{CartItem, ProductId, UserId};

use super::{CartStore, RepositoryError};

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_id: String,
    name: String,
    price: Decimal,
    quantity: i32,
    size: Option<String>,
    image: Option<String>,
    description: Option<String>,
    color: Option<String>,
    weight: Option<Decimal>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative quantity {} for product {}",
                row.quantity, row.product_id
            ))
        })?;

        Ok(Self {
            product_id: ProductId::new(row.product_id),
            name: row.name,
            price: row.price,
            quantity,
            size: row.size,
            image: row.image,
            description: row.description,
            color: row.color,
            weight: row.weight,
        })
    }
}

fn quantity_column(item: &CartItem) -> Result<i32, RepositoryError> {
    i32::try_from(item.quantity)
        .map_err(|_| RepositoryError::Conflict(format!("quantity {} out of range", item.quantity)))
}

const UPSERT_ITEM: &str = r"
    INSERT INTO storefront.cart_items
        (user_id, product_id, name, price, quantity, size, image, description, color, weight)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (user_id, product_id)
    DO UPDATE SET name = EXCLUDED.name,
                  price = EXCLUDED.price,
                  quantity = EXCLUDED.quantity,
                  size = EXCLUDED.size,
                  image = EXCLUDED.image,
                  description = EXCLUDED.description,
                  color = EXCLUDED.color,
                  weight = EXCLUDED.weight,
                  updated_at = now()
";

/// Postgres-backed [`CartStore`].
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn load(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT product_id, name, price, quantity, size, image, description, color, weight
            FROM storefront.cart_items
            WHERE user_id = $1
            ORDER BY updated_at, product_id
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    async fn upsert_item(&self, user_id: UserId, item: &CartItem) -> Result<(), RepositoryError> {
        sqlx::query(UPSERT_ITEM)
            .bind(user_id)
            .bind(item.product_id.as_str())
            .bind(&item.name)
            .bind(item.price)
            .bind(quantity_column(item)?)
            .bind(&item.size)
            .bind(&item.image)
            .bind(&item.description)
            .bind(&item.color)
            .bind(item.weight)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn replace(&self, user_id: UserId, items: &[CartItem]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM storefront.cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(UPSERT_ITEM)
                .bind(user_id)
                .bind(item.product_id.as_str())
                .bind(&item.name)
                .bind(item.price)
                .bind(quantity_column(item)?)
                .bind(&item.size)
                .bind(&item.image)
                .bind(&item.description)
                .bind(&item.color)
                .bind(item.weight)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
