//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::catalog::{CatalogError, CatalogReader, SanityClient};
use crate::config::StorefrontConfig;
use crate::db::Stores;
use crate::payments::{PaymentError, PaymentGateway, StripeClient};
use crate::realtime::OrderEvents;
use crate::shipping::{ShippingError, ShippingProvider, ShippoClient};

/// Error building a vendor client at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("shipping client: {0}")]
    Shipping(#[from] ShippingError),
    #[error("catalog client: {0}")]
    Catalog(#[from] CatalogError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Vendor clients sit behind
/// trait objects so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    stores: Stores,
    payments: Arc<dyn PaymentGateway>,
    shipping: Arc<dyn ShippingProvider>,
    catalog: Arc<dyn CatalogReader>,
    events: OrderEvents,
}

/// Everything `AppState` is assembled from.
pub struct StateParts {
    pub config: StorefrontConfig,
    pub pool: Option<PgPool>,
    pub stores: Stores,
    pub payments: Arc<dyn PaymentGateway>,
    pub shipping: Arc<dyn ShippingProvider>,
    pub catalog: Arc<dyn CatalogReader>,
}

impl AppState {
    /// Create the production state: Postgres stores and live vendor clients.
    ///
    /// # Errors
    ///
    /// Returns an error if a vendor client cannot be built from config.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let payments = Arc::new(StripeClient::new(&config.stripe)?);
        let shipping = Arc::new(ShippoClient::new(&config.shippo)?);
        let catalog = Arc::new(SanityClient::new(&config.sanity)?);

        Ok(Self::from_parts(StateParts {
            stores: Stores::postgres(&pool),
            pool: Some(pool),
            config,
            payments,
            shipping,
            catalog,
        }))
    }

    /// Assemble state from explicit parts.
    #[must_use]
    pub fn from_parts(parts: StateParts) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config: parts.config,
                pool: parts.pool,
                stores: parts.stores,
                payments: parts.payments,
                shipping: parts.shipping,
                catalog: parts.catalog,
                events: OrderEvents::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, absent when running on in-memory stores.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn payments(&self) -> &dyn PaymentGateway {
        self.inner.payments.as_ref()
    }

    #[must_use]
    pub fn shipping(&self) -> &dyn ShippingProvider {
        self.inner.shipping.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogReader {
        self.inner.catalog.as_ref()
    }

    /// The realtime order event hub.
    #[must_use]
    pub fn events(&self) -> &OrderEvents {
        &self.inner.events
    }
}
