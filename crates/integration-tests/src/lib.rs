//! Integration tests for Threadline.
//!
//! Everything runs in process: the storefront router is driven through
//! `tower::ServiceExt::oneshot` against the in-memory stores and the fakes in
//! [`fakes`], while the vendor HTTP clients are exercised against `wiremock`.
//!
//! ```bash
//! cargo test -p threadline-integration-tests
//! ```

pub mod fakes;

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use threadline_core::CurrencyCode;
use threadline_storefront::app;
use threadline_storefront::config::{
    CartSyncPolicy, OriginAddress, SanityConfig, ShippoConfig, StorefrontConfig, StripeConfig,
};
use threadline_storefront::db::{Stores, memory::MemoryStore};
use threadline_storefront::middleware::SESSION_COOKIE_NAME;
use threadline_storefront::state::{AppState, StateParts};

use fakes::{FakeCatalog, FakePayments, FakeShipping};

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_integration";
pub const SHIPPO_WEBHOOK_SECRET: &str = "shippo_integration";
pub const PUBLISHABLE_KEY: &str = "pk_test_integration";

/// Every request claims to come from this client, so the rate limiters can
/// key on it without a socket.
const CLIENT_IP: &str = "203.0.113.7";

/// Storefront config pointing nowhere; vendor calls go to the fakes.
#[must_use]
pub fn test_config(cart_sync_policy: CartSyncPolicy) -> StorefrontConfig {
    let unused = "http://127.0.0.1:9".to_owned();
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused".to_owned()),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "http://localhost:3000".to_owned(),
        session_secret: SecretString::from("integration-session-secret-0123456789abcdef".to_owned()),
        stripe: StripeConfig {
            api_base: unused.clone(),
            secret_key: SecretString::from("sk_test_integration".to_owned()),
            publishable_key: PUBLISHABLE_KEY.to_owned(),
            webhook_secret: SecretString::from(STRIPE_WEBHOOK_SECRET.to_owned()),
            currency: CurrencyCode::USD,
        },
        shippo: ShippoConfig {
            api_base: unused,
            api_key: SecretString::from("shippo_test_integration".to_owned()),
            webhook_secret: SecretString::from(SHIPPO_WEBHOOK_SECRET.to_owned()),
            origin: origin_address(),
        },
        sanity: SanityConfig {
            project_id: "integration".to_owned(),
            dataset: "production".to_owned(),
            api_version: "2024-01-01".to_owned(),
            token: None,
            api_base: None,
        },
        cart_sync_policy,
        sentry_dsn: None,
        sentry_environment: None,
        log_json: false,
    }
}

#[must_use]
pub fn origin_address() -> OriginAddress {
    OriginAddress {
        name: "Threadline Warehouse".to_owned(),
        street1: "400 Union Ave".to_owned(),
        city: "Memphis".to_owned(),
        state: "TN".to_owned(),
        zip: "38103".to_owned(),
        country: "US".to_owned(),
        phone: "901-555-0100".to_owned(),
        email: "warehouse@threadline.example".to_owned(),
    }
}

/// A deliverable address in the shape `POST /api/checkout/address` takes.
#[must_use]
pub fn address_json(email: &str) -> Value {
    json!({
        "name": "Ada Lovelace",
        "street1": "12 Analytical Way",
        "street2": null,
        "city": "Nashville",
        "state": "TN",
        "postal_code": "37203",
        "country": "US",
        "phone": "615-555-0142",
        "email": email,
    })
}

/// Read a money field whether it was encoded as a string or a number.
#[must_use]
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected a money value, got {other}"),
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// The storefront wired to in-memory stores and fake vendors, with a
/// one-cookie jar so consecutive requests share a session.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub memory: Arc<MemoryStore>,
    pub payments: Arc<FakePayments>,
    pub shipping: Arc<FakeShipping>,
    cookie: Mutex<Option<String>>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new(CartSyncPolicy::Replace)
    }
}

impl TestApp {
    #[must_use]
    pub fn new(cart_sync_policy: CartSyncPolicy) -> Self {
        let (stores, memory) = Stores::in_memory();
        let payments = Arc::new(FakePayments::default());
        let shipping = Arc::new(FakeShipping::default());

        let state = AppState::from_parts(StateParts {
            config: test_config(cart_sync_policy),
            pool: None,
            stores,
            payments: payments.clone(),
            shipping: shipping.clone(),
            catalog: Arc::new(FakeCatalog::default()),
        });

        Self {
            router: app(state.clone()),
            state,
            memory,
            payments,
            shipping,
            cookie: Mutex::new(None),
        }
    }

    /// Forget the session cookie, as a fresh browser would.
    pub fn clear_cookies(&self) {
        *self.cookie.lock().expect("cookie jar") = None;
    }

    /// Send a request and return the unbuffered response.
    pub async fn raw(&self, mut request: Request<Body>) -> Response {
        let cookie = self.cookie.lock().expect("cookie jar").clone();
        let headers = request.headers_mut();
        headers.insert("x-forwarded-for", HeaderValue::from_static(CLIENT_IP));
        if let Some(cookie) = cookie {
            headers.insert(
                header::COOKIE,
                HeaderValue::from_str(&cookie).expect("cookie header"),
            );
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        self.store_cookie(response.headers());
        response
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.raw(request).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(
            Request::get(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(
            Request::delete(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> TestResponse {
        self.json_request(Method::POST, path, body).await
    }

    pub async fn patch_json(&self, path: &str, body: &Value) -> TestResponse {
        self.json_request(Method::PATCH, path, body).await
    }

    /// `POST` with an empty body, for step transitions.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.send(
            Request::post(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.send(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .expect("build request"),
        )
        .await
    }

    /// `POST` raw bytes with extra headers, for webhook deliveries.
    pub async fn post_bytes(
        &self,
        path: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request = Request::post(path).header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request.body(Body::from(body)).expect("build request"))
            .await
    }

    async fn json_request(&self, method: Method, path: &str, body: &Value) -> TestResponse {
        self.send(
            Request::builder()
                .method(method)
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("build request"),
        )
        .await
    }

    fn store_cookie(&self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let pair = value.split(';').next().unwrap_or_default().trim();
            let Some((name, session_id)) = pair.split_once('=') else {
                continue;
            };
            if name == SESSION_COOKIE_NAME {
                *self.cookie.lock().expect("cookie jar") =
                    (!session_id.is_empty()).then(|| pair.to_owned());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Flows
    // -------------------------------------------------------------------------

    pub async fn add_to_cart(&self, slug: &str, quantity: u32, size: Option<&str>) -> TestResponse {
        self.post_json(
            "/api/cart/items",
            &json!({ "slug": slug, "quantity": quantity, "size": size }),
        )
        .await
    }

    /// Walk checkout from address to payment with the ground rate and
    /// return the payment view.
    pub async fn checkout_to_payment(&self, email: &str) -> Value {
        let response = self
            .post_json("/api/checkout/address", &json!({ "address": address_json(email) }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "address: {}", response.text());

        let response = self
            .post_json("/api/checkout/rate", &json!({ "rateId": "rate_ground" }))
            .await;
        assert_eq!(response.status, StatusCode::OK, "rate: {}", response.text());

        let response = self.post_empty("/api/checkout/review").await;
        assert_eq!(response.status, StatusCode::OK, "review: {}", response.text());

        let response = self.post_empty("/api/checkout/payment").await;
        assert_eq!(response.status, StatusCode::OK, "payment: {}", response.text());
        response.json()
    }

    /// Register and stay signed in. Uses one auth request.
    pub async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.post_form(
            "/auth/register",
            &[
                ("email", email),
                ("password", password),
                ("password_confirm", password),
            ],
        )
        .await
    }

    /// Sign in. Uses one auth request.
    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post_form("/auth/login", &[("email", email), ("password", password)])
            .await
    }

    /// Sign out. Uses one auth request.
    pub async fn logout(&self) -> TestResponse {
        self.post_empty("/auth/logout").await
    }
}
