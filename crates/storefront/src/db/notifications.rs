//! In-app order notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use threadline_core::{OrderId, UserId};

use super::{NotificationStore, RepositoryError};
use crate::models::{NewNotification, Notification};

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: Option<Uuid>,
    order_id: Uuid,
    kind: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id.map(UserId::new),
            order_id: OrderId::new(row.order_id),
            kind: row.kind,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed [`NotificationStore`].
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn add(&self, notification: &NewNotification) -> Result<Notification, RepositoryError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r"
            INSERT INTO storefront.notifications (user_id, order_id, kind, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, order_id, kind, message, created_at
            ",
        )
        .bind(notification.user_id)
        .bind(notification.order_id)
        .bind(&notification.kind)
        .bind(&notification.message)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r"
            SELECT id, user_id, order_id, kind, message, created_at
            FROM storefront.notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }
}
