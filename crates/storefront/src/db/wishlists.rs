//! Wishlist rows, one per (user, product).

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use threadline_core::{ProductId, UserId, WishlistItem};

use super::{RepositoryError, WishlistStore};

#[derive(Debug, sqlx::FromRow)]
struct WishlistRow {
    product_id: String,
    product_name: String,
    price: Decimal,
    image_url: String,
    size: Option<String>,
}

impl From<WishlistRow> for WishlistItem {
    fn from(row: WishlistRow) -> Self {
        Self {
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            price: row.price,
            image_url: row.image_url,
            size: row.size,
        }
    }
}

/// Postgres-backed [`WishlistStore`].
pub struct PgWishlistStore {
    pool: PgPool,
}

impl PgWishlistStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WishlistStore for PgWishlistStore {
    async fn list(&self, user_id: UserId) -> Result<Vec<WishlistItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, WishlistRow>(
            r"
            SELECT product_id, product_name, price, image_url, size
            FROM storefront.wishlist_items
            WHERE user_id = $1
            ORDER BY created_at
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WishlistItem::from).collect())
    }

    async fn add(&self, user_id: UserId, item: &WishlistItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.wishlist_items
                (user_id, product_id, product_name, price, image_url, size)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(item.product_id.as_str())
        .bind(&item.product_name)
        .bind(item.price)
        .bind(&item.image_url)
        .bind(&item.size)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM storefront.wishlist_items WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user_id)
        .bind(product_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
