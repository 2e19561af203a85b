//! Stripe REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

use crate::config::StripeConfig;

use super::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent};

/// Stripe API client for payment intents.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

/// Build an `Api` error from a Stripe error envelope, falling back to the raw
/// body when it is not one.
fn api_error(status: u16, body: &str) -> PaymentError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => PaymentError::Api {
            status,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| "payment processor error".to_owned()),
            code: envelope.error.code,
            error_type: envelope.error.error_type,
        },
        Err(_) => PaymentError::Api {
            status,
            message: body.chars().take(200).collect(),
            code: None,
            error_type: None,
        },
    }
}

/// Form fields for `POST /v1/payment_intents`.
fn intent_form(request: &CreateIntent) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_owned(), request.amount.to_string()),
        ("currency".to_owned(), request.currency.as_str().to_owned()),
        (
            "automatic_payment_methods[enabled]".to_owned(),
            "true".to_owned(),
        ),
    ];
    if let Some(email) = &request.receipt_email {
        form.push(("receipt_email".to_owned(), email.clone()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, request), fields(amount = request.amount))]
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let url = format!("{}/v1/payment_intents", self.api_base);
        let response = self
            .client
            .post(&url)
            .form(&intent_form(request))
            .send()
            .await?;

        Self::read_intent(response).await
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents/{payment_intent_id}", self.api_base);
        let response = self.client.get(&url).send().await?;

        Self::read_intent(response).await
    }
}
