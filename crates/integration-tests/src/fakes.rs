//! In-process stand-ins for the payment processor, shipping aggregator and CMS.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use threadline_core::{ProductId, ShippingRate};
use threadline_storefront::catalog::{CatalogError, CatalogReader, Category, Product};
use threadline_storefront::payments::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent};
use threadline_storefront::shipping::{
    RateRequest, ShippingError, ShippingProvider, Track, Transaction,
};

/// Tracking number on every label the fake aggregator sells.
pub const TRACKING_NUMBER: &str = "9400100000000000000001";

/// Payment processor that confirms every intent it created.
#[derive(Default)]
pub struct FakePayments {
    intents: Mutex<Vec<PaymentIntent>>,
    declining: AtomicBool,
}

impl FakePayments {
    /// Reject further intents the way the processor rejects a declined card.
    pub fn decline_cards(&self) {
        self.declining.store(true, Ordering::SeqCst);
    }

    /// Intents created so far, oldest first.
    pub fn created(&self) -> Vec<PaymentIntent> {
        self.intents.lock().expect("intents lock").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_intent(&self, request: &CreateIntent) -> Result<PaymentIntent, PaymentError> {
        if self.declining.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 402,
                message: "Your card was declined.".to_owned(),
                code: Some("card_declined".to_owned()),
                error_type: Some("card_error".to_owned()),
            });
        }

        let mut intents = self.intents.lock().expect("intents lock");
        let id = format!("pi_fake_{}", intents.len() + 1);
        let intent = PaymentIntent {
            client_secret: Some(format!("{id}_secret_test")),
            id,
            amount: request.amount,
            currency: request.currency.as_str().to_owned(),
            status: "requires_payment_method".to_owned(),
            receipt_email: request.receipt_email.clone(),
            metadata: request.metadata.clone(),
        };
        intents.push(intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        let intents = self.intents.lock().expect("intents lock");
        intents
            .iter()
            .find(|intent| intent.id == id)
            .map(|intent| PaymentIntent {
                status: "succeeded".to_owned(),
                client_secret: None,
                ..intent.clone()
            })
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such payment_intent: '{id}'"),
                code: Some("resource_missing".to_owned()),
                error_type: Some("invalid_request_error".to_owned()),
            })
    }
}

/// Shipping aggregator with two fixed rates and labels that always print.
#[derive(Default)]
pub struct FakeShipping {
    rate_requests: Mutex<Vec<RateRequest>>,
    labels: AtomicUsize,
}

impl FakeShipping {
    pub fn rate_requests(&self) -> Vec<RateRequest> {
        self.rate_requests.lock().expect("rate requests lock").clone()
    }

    pub fn labels_bought(&self) -> usize {
        self.labels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShippingProvider for FakeShipping {
    async fn get_rates(&self, request: &RateRequest) -> Result<Vec<ShippingRate>, ShippingError> {
        self.rate_requests
            .lock()
            .expect("rate requests lock")
            .push(request.clone());
        Ok(vec![
            ShippingRate {
                id: "rate_ground".to_owned(),
                provider: "USPS".to_owned(),
                service: "Ground Advantage".to_owned(),
                price: Decimal::from(3),
                currency: "USD".to_owned(),
                estimated_days: Some(4),
                duration_terms: None,
            },
            ShippingRate {
                id: "rate_express".to_owned(),
                provider: "UPS".to_owned(),
                service: "Next Day Air".to_owned(),
                price: Decimal::from(12),
                currency: "USD".to_owned(),
                estimated_days: Some(1),
                duration_terms: Some("Overnight".to_owned()),
            },
        ])
    }

    async fn purchase_label(&self, rate_id: &str) -> Result<Transaction, ShippingError> {
        self.labels.fetch_add(1, Ordering::SeqCst);
        serde_json::from_value(json!({
            "object_id": format!("tx_{rate_id}"),
            "status": "SUCCESS",
            "tracking_number": TRACKING_NUMBER,
            "label_url": "https://labels.example/tx.pdf",
        }))
        .map_err(|e| ShippingError::Parse(e.to_string()))
    }

    async fn track(&self, carrier: &str, tracking_number: &str) -> Result<Track, ShippingError> {
        serde_json::from_value(json!({
            "carrier": carrier,
            "tracking_number": tracking_number,
            "tracking_status": {
                "status": "TRANSIT",
                "status_details": "Arrived at regional facility",
                "status_date": "2026-03-03T09:30:00Z",
                "location": { "city": "Memphis", "state": "TN", "country": "US" }
            }
        }))
        .map_err(|e| ShippingError::Parse(e.to_string()))
    }
}

/// Fixed two-product catalog.
pub struct FakeCatalog {
    products: Vec<Product>,
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self {
            products: vec![
                Product {
                    id: ProductId::new("prod_linen_shirt"),
                    name: "Linen Shirt".to_owned(),
                    slug: "linen-shirt".to_owned(),
                    price: Decimal::from(50),
                    description: Some("Breathable linen button-down".to_owned()),
                    images: vec!["https://cdn.example/linen-shirt.jpg".to_owned()],
                    category: Some("shirts".to_owned()),
                    sizes: vec!["M".to_owned(), "L".to_owned()],
                    colors: vec!["Natural".to_owned()],
                    weight: Some(Decimal::new(3, 1)),
                },
                Product {
                    id: ProductId::new("prod_wool_socks"),
                    name: "Wool Socks".to_owned(),
                    slug: "wool-socks".to_owned(),
                    price: Decimal::from(12),
                    description: Some("Merino crew socks".to_owned()),
                    images: Vec::new(),
                    category: Some("accessories".to_owned()),
                    sizes: Vec::new(),
                    colors: Vec::new(),
                    weight: None,
                },
            ],
        }
    }
}

#[async_trait]
impl CatalogReader for FakeCatalog {
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>, CatalogError> {
        Ok(self
            .products
            .iter()
            .filter(|p| category.is_none_or(|c| p.category.as_deref() == Some(c)))
            .cloned()
            .collect())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Product, CatalogError> {
        self.products
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("Product not found: {slug}")))
    }

    async fn search(&self, term: &str) -> Result<Vec<Product>, CatalogError> {
        let term = term.to_lowercase();
        Ok(self
            .products
            .iter()
            .filter(|p| {
                p.name
                    .to_lowercase()
                    .split_whitespace()
                    .any(|word| word.starts_with(&term))
            })
            .cloned()
            .collect())
    }

    async fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        let categories = BTreeMap::from([("accessories", "Accessories"), ("shirts", "Shirts")]);
        Ok(categories
            .into_iter()
            .map(|(slug, title)| Category {
                id: format!("cat_{slug}"),
                title: title.to_owned(),
                slug: slug.to_owned(),
            })
            .collect())
    }
}
