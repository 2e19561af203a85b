//! Shippo REST client.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

use threadline_core::{ShippingAddress, ShippingRate};

use crate::config::{OriginAddress, ShippoConfig};

use super::{RateRequest, ShippingError, ShippingProvider, Track, Transaction};

/// Default parcel box, inches.
const PARCEL_LENGTH_IN: &str = "10";
const PARCEL_WIDTH_IN: &str = "8";
const PARCEL_HEIGHT_IN: &str = "4";

/// Shippo API client for rates, labels and tracking.
#[derive(Clone)]
pub struct ShippoClient {
    client: reqwest::Client,
    api_base: String,
    origin: OriginAddress,
}

#[derive(Debug, Deserialize)]
struct ShipmentResponse {
    #[serde(default)]
    rates: Vec<RateObject>,
}

#[derive(Debug, Deserialize)]
struct RateObject {
    object_id: String,
    provider: String,
    servicelevel: ServiceLevel,
    amount: String,
    currency: String,
    #[serde(default)]
    estimated_days: Option<u32>,
    #[serde(default)]
    duration_terms: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceLevel {
    name: String,
}

impl TryFrom<RateObject> for ShippingRate {
    type Error = ShippingError;

    fn try_from(rate: RateObject) -> Result<Self, Self::Error> {
        let price = Decimal::from_str(&rate.amount).map_err(|e| {
            ShippingError::Parse(format!("invalid rate amount {:?}: {e}", rate.amount))
        })?;

        Ok(Self {
            id: rate.object_id,
            provider: rate.provider,
            service: rate.servicelevel.name,
            price,
            currency: rate.currency,
            estimated_days: rate.estimated_days,
            duration_terms: rate.duration_terms,
        })
    }
}

impl ShippoClient {
    /// Create a new Shippo API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ShippoConfig) -> Result<Self, ShippingError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("ShippoToken {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| ShippingError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            origin: config.origin.clone(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ShippingError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ShippingError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

fn origin_json(origin: &OriginAddress) -> serde_json::Value {
    json!({
        "name": origin.name,
        "street1": origin.street1,
        "city": origin.city,
        "state": origin.state,
        "zip": origin.zip,
        "country": origin.country,
        "phone": origin.phone,
        "email": origin.email,
    })
}

fn destination_json(to: &ShippingAddress) -> serde_json::Value {
    json!({
        "name": to.name,
        "street1": to.street1,
        "street2": to.street2,
        "city": to.city,
        "state": to.state,
        "zip": to.postal_code,
        "country": to.country,
        "phone": to.phone,
        "email": to.email,
    })
}

#[async_trait]
impl ShippingProvider for ShippoClient {
    #[instrument(skip(self, request), fields(country = %request.to.country, weight_kg = %request.weight_kg))]
    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>, ShippingError> {
        let body = json!({
            "address_from": origin_json(&self.origin),
            "address_to": destination_json(&request.to),
            "parcels": [{
                "length": PARCEL_LENGTH_IN,
                "width": PARCEL_WIDTH_IN,
                "height": PARCEL_HEIGHT_IN,
                "distance_unit": "in",
                "weight": request.weight_kg.normalize().to_string(),
                "mass_unit": "kg",
            }],
            "async": false,
        });

        let url = format!("{}/shipments", self.api_base);
        let response = Self::check(self.client.post(&url).json(&body).send().await?).await?;

        let shipment: ShipmentResponse = response
            .json()
            .await
            .map_err(|e| ShippingError::Parse(e.to_string()))?;

        let mut rates = Vec::with_capacity(shipment.rates.len());
        for rate in shipment.rates {
            match ShippingRate::try_from(rate) {
                Ok(rate) => rates.push(rate),
                Err(e) => warn!(error = %e, "Skipping unparseable shipping rate"),
            }
        }
        rates.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(rates)
    }

    #[instrument(skip(self))]
    async fn purchase_label(&self, rate_id: &str) -> Result<Transaction, ShippingError> {
        let body = json!({
            "rate": rate_id,
            "label_file_type": "PDF",
            "async": false,
        });

        let url = format!("{}/transactions", self.api_base);
        let response = Self::check(self.client.post(&url).json(&body).send().await?).await?;

        let transaction: Transaction = response
            .json()
            .await
            .map_err(|e| ShippingError::Parse(e.to_string()))?;

        if !transaction.is_success() {
            return Err(ShippingError::LabelFailed(format!(
                "status {}: {}",
                transaction.status,
                transaction.message_summary()
            )));
        }
        Ok(transaction)
    }

    #[instrument(skip(self))]
    async fn track(&self, carrier: &str, tracking_number: &str) -> Result<Track, ShippingError> {
        let url = format!("{}/tracks/{carrier}/{tracking_number}", self.api_base);
        let response = Self::check(self.client.get(&url).send().await?).await?;

        response
            .json()
            .await
            .map_err(|e| ShippingError::Parse(e.to_string()))
    }
}
