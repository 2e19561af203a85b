//! Saved shipping addresses.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use threadline_core::{ShippingAddress, UserId};

use super::{AddressStore, RepositoryError};

/// Postgres-backed [`AddressStore`].
pub struct PgAddressStore {
    pool: PgPool,
}

impl PgAddressStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressStore for PgAddressStore {
    async fn saved_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, RepositoryError> {
        let row: Option<(Json<ShippingAddress>,)> = sqlx::query_as(
            r"
            SELECT address
            FROM storefront.saved_addresses
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(address),)| address))
    }

    async fn save_address(
        &self,
        user_id: UserId,
        address: &ShippingAddress,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.saved_addresses (user_id, address)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET address = EXCLUDED.address, updated_at = now()
            ",
        )
        .bind(user_id)
        .bind(Json(address))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
