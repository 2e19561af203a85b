//! Shipments and carrier tracking events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use threadline_core::{OrderId, ShipmentId, ShipmentStatus};

use super::{RepositoryError, ShipmentStore, parse_column};
use crate::models::{NewShipment, NewTrackingEvent, Shipment, TrackingEvent};

const SHIPMENT_COLUMNS: &str = "id, order_id, carrier, tracking_number, rate_id, status, \
     label_url, estimated_delivery, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ShipmentRow {
    id: Uuid,
    order_id: Uuid,
    carrier: String,
    tracking_number: Option<String>,
    rate_id: String,
    status: String,
    label_url: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = RepositoryError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ShipmentId::new(row.id),
            order_id: OrderId::new(row.order_id),
            carrier: row.carrier,
            tracking_number: row.tracking_number,
            rate_id: row.rate_id,
            status: parse_column(&row.status, "shipments.status")?,
            label_url: row.label_url,
            estimated_delivery: row.estimated_delivery,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TrackingEventRow {
    id: i64,
    shipment_id: Uuid,
    status: String,
    status_details: String,
    location: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<TrackingEventRow> for TrackingEvent {
    type Error = RepositoryError;

    fn try_from(row: TrackingEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            shipment_id: ShipmentId::new(row.shipment_id),
            status: parse_column(&row.status, "tracking_events.status")?,
            status_details: row.status_details,
            location: row.location,
            occurred_at: row.occurred_at,
        })
    }
}

/// Postgres-backed [`ShipmentStore`].
pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn create_shipment(&self, shipment: &NewShipment) -> Result<Shipment, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO storefront.shipments
                (id, order_id, carrier, tracking_number, rate_id, status, label_url,
                 estimated_delivery)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING {SHIPMENT_COLUMNS}
            "
        );

        let inserted = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(shipment.order_id)
            .bind(&shipment.carrier)
            .bind(&shipment.tracking_number)
            .bind(&shipment.rate_id)
            .bind(shipment.status.as_str())
            .bind(&shipment.label_url)
            .bind(shipment.estimated_delivery)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(row) => Shipment::try_from(row),
            None => self
                .shipment_for_order(shipment.order_id)
                .await?
                .ok_or(RepositoryError::NotFound),
        }
    }

    async fn shipment_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM storefront.shipments WHERE order_id = $1");
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn find_by_tracking(
        &self,
        tracking_number: &str,
        carrier: &str,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let sql = format!(
            "SELECT {SHIPMENT_COLUMNS} FROM storefront.shipments \
             WHERE tracking_number = $1 AND lower(carrier) = lower($2)"
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(tracking_number)
            .bind(carrier)
            .fetch_optional(&self.pool)
            .await?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn update_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let sql = format!(
            r"
            UPDATE storefront.shipments
            SET status = $2,
                estimated_delivery = COALESCE($3, estimated_delivery),
                updated_at = now()
            WHERE id = $1
            RETURNING {SHIPMENT_COLUMNS}
            "
        );
        sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(estimated_delivery)
            .fetch_optional(&self.pool)
            .await?
            .map(Shipment::try_from)
            .transpose()
    }

    async fn add_tracking_event(
        &self,
        event: &NewTrackingEvent,
    ) -> Result<TrackingEvent, RepositoryError> {
        let row = sqlx::query_as::<_, TrackingEventRow>(
            r"
            INSERT INTO storefront.tracking_events
                (shipment_id, status, status_details, location, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, shipment_id, status, status_details, location, occurred_at
            ",
        )
        .bind(event.shipment_id)
        .bind(event.status.as_str())
        .bind(&event.status_details)
        .bind(&event.location)
        .bind(event.occurred_at)
        .fetch_one(&self.pool)
        .await?;

        TrackingEvent::try_from(row)
    }

    async fn tracking_events(
        &self,
        shipment_id: ShipmentId,
    ) -> Result<Vec<TrackingEvent>, RepositoryError> {
        let rows = sqlx::query_as::<_, TrackingEventRow>(
            r"
            SELECT id, shipment_id, status, status_details, location, occurred_at
            FROM storefront.tracking_events
            WHERE shipment_id = $1
            ORDER BY occurred_at, id
            ",
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TrackingEvent::try_from).collect()
    }
}
