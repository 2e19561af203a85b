//! Signed vendor callbacks and the live order stream they feed.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;

use threadline_integration_tests::fakes::TRACKING_NUMBER;
use threadline_integration_tests::{SHIPPO_WEBHOOK_SECRET, STRIPE_WEBHOOK_SECRET, TestApp};
use threadline_storefront::{payments, shipping};

const STRIPE_PATH: &str = "/api/webhooks/stripe";
const SHIPPO_PATH: &str = "/api/shipping/webhook";

/// Complete a guest checkout in the app's session and return the order id.
async fn place_order(app: &TestApp) -> String {
    app.add_to_cart("linen-shirt", 1, Some("M")).await;
    app.checkout_to_payment("ada@example.com").await;
    let done = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await
        .json();
    done["orderId"].as_str().unwrap().to_owned()
}

fn payment_event(event_type: &str, payment_intent_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_integration",
        "type": event_type,
        "data": { "object": { "id": payment_intent_id, "object": "payment_intent" } }
    }))
    .unwrap()
}

fn tracking_event(status: &str, details: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "track_updated",
        "test": true,
        "data": {
            "carrier": "usps",
            "tracking_number": TRACKING_NUMBER,
            "eta": "2026-03-05T18:00:00Z",
            "tracking_status": {
                "status": status,
                "status_details": details,
                "status_date": "2026-03-03T09:30:00Z",
                "location": { "city": "Memphis", "state": "TN", "country": "US" }
            }
        }
    }))
    .unwrap()
}

async fn deliver_payment_event(app: &TestApp, body: Vec<u8>) -> StatusCode {
    let signature =
        payments::webhook::sign_payload(&body, STRIPE_WEBHOOK_SECRET, Utc::now().timestamp());
    app.post_bytes(STRIPE_PATH, body, &[("stripe-signature", &signature)])
        .await
        .status
}

async fn deliver_tracking_event(app: &TestApp, body: Vec<u8>) -> StatusCode {
    let signature = shipping::webhook::sign_payload(&body, SHIPPO_WEBHOOK_SECRET);
    app.post_bytes(
        SHIPPO_PATH,
        body,
        &[(shipping::webhook::SIGNATURE_HEADER, &signature)],
    )
    .await
    .status
}

#[tokio::test]
async fn test_payment_webhook_completes_the_order_once() {
    let app = TestApp::default();
    let order_id = place_order(&app).await;

    let body = payment_event("payment_intent.succeeded", "pi_fake_1");
    assert_eq!(deliver_payment_event(&app, body.clone()).await, StatusCode::OK);
    // Redelivery is harmless.
    assert_eq!(deliver_payment_event(&app, body).await, StatusCode::OK);

    let detail = app.get(&format!("/api/orders/{order_id}")).await.json();
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["payment_status"], "paid");
    assert_eq!(app.memory.all_orders().await.len(), 1);
}

#[tokio::test]
async fn test_payment_webhook_ahead_of_completion_leaves_a_confirmed_order() {
    let app = TestApp::default();
    app.add_to_cart("linen-shirt", 1, Some("M")).await;
    app.checkout_to_payment("ada@example.com").await;

    let body = payment_event("payment_intent.succeeded", "pi_fake_1");
    assert_eq!(deliver_payment_event(&app, body).await, StatusCode::OK);
    assert!(app.memory.all_orders().await.is_empty());

    let done = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await
        .json();
    let order_id = done["orderId"].as_str().unwrap();

    let detail = app.get(&format!("/api/orders/{order_id}")).await.json();
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["payment_status"], "paid");
}

#[tokio::test]
async fn test_late_payment_webhook_keeps_a_delivered_order() {
    let app = TestApp::default();
    let order_id = place_order(&app).await;

    let delivered = tracking_event("DELIVERED", "Left at front door");
    assert_eq!(deliver_tracking_event(&app, delivered).await, StatusCode::OK);

    let body = payment_event("payment_intent.succeeded", "pi_fake_1");
    assert_eq!(deliver_payment_event(&app, body).await, StatusCode::OK);

    let detail = app.get(&format!("/api/orders/{order_id}")).await.json();
    assert_eq!(detail["status"], "delivered");
}

#[tokio::test]
async fn test_payment_webhook_acknowledges_what_it_ignores() {
    let app = TestApp::default();

    let failed = payment_event("payment_intent.payment_failed", "pi_fake_1");
    assert_eq!(deliver_payment_event(&app, failed).await, StatusCode::OK);

    let unknown = payment_event("payment_intent.succeeded", "pi_never_seen");
    assert_eq!(deliver_payment_event(&app, unknown).await, StatusCode::OK);
}

#[tokio::test]
async fn test_payment_webhook_rejects_bad_signatures() {
    let app = TestApp::default();
    let body = payment_event("payment_intent.succeeded", "pi_fake_1");

    let unsigned = app.post_bytes(STRIPE_PATH, body.clone(), &[]).await;
    assert_eq!(unsigned.status, StatusCode::BAD_REQUEST);

    let forged = payments::webhook::sign_payload(&body, "whsec_wrong", Utc::now().timestamp());
    let response = app
        .post_bytes(STRIPE_PATH, body.clone(), &[("stripe-signature", &forged)])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let stale = payments::webhook::sign_payload(
        &body,
        STRIPE_WEBHOOK_SECRET,
        Utc::now().timestamp() - 3600,
    );
    let response = app
        .post_bytes(STRIPE_PATH, body, &[("stripe-signature", &stale)])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tracking_webhook_updates_shipment_and_delivers_order() {
    let app = TestApp::default();
    let order_id = place_order(&app).await;

    let transit = tracking_event("TRANSIT", "Departed Memphis hub");
    assert_eq!(deliver_tracking_event(&app, transit).await, StatusCode::OK);

    let detail = app.get(&format!("/api/orders/{order_id}")).await.json();
    assert_eq!(detail["shipment"]["status"], "transit");
    assert_eq!(detail["status"], "completed");
    let events = detail["tracking_events"].as_array().unwrap();
    assert_eq!(events.len(), 2);

    let delivered = tracking_event("DELIVERED", "Left at front door");
    assert_eq!(deliver_tracking_event(&app, delivered).await, StatusCode::OK);

    let detail = app.get(&format!("/api/orders/{order_id}")).await.json();
    assert_eq!(detail["shipment"]["status"], "delivered");
    assert_eq!(detail["status"], "delivered");
}

#[tokio::test]
async fn test_tracking_webhook_rejects_unsigned_bodies() {
    let app = TestApp::default();
    place_order(&app).await;

    let body = tracking_event("DELIVERED", "Left at front door");
    let response = app
        .post_bytes(
            SHIPPO_PATH,
            body,
            &[(shipping::webhook::SIGNATURE_HEADER, "00ff")],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        app.memory.all_orders().await[0].status,
        threadline_core::OrderStatus::Completed
    );
}

#[tokio::test]
async fn test_webhooks_are_not_rate_limited() {
    let app = TestApp::default();

    for _ in 0..60 {
        let body = payment_event("charge.refunded", "pi_fake_1");
        assert_eq!(deliver_payment_event(&app, body).await, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_order_stream_relays_tracking_updates() {
    let app = TestApp::default();
    let order_id = place_order(&app).await;

    let response = app
        .raw(
            Request::get(format!("/api/orders/{order_id}/events"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut stream = response.into_body().into_data_stream();

    let transit = tracking_event("TRANSIT", "Departed Memphis hub");
    assert_eq!(deliver_tracking_event(&app, transit).await, StatusCode::OK);

    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.contains("event: tracking_updated"), "{received}");
    assert!(received.contains("Departed Memphis hub"), "{received}");
}

#[tokio::test]
async fn test_order_stream_is_hidden_from_strangers() {
    let app = TestApp::default();
    let order_id = place_order(&app).await;
    app.clear_cookies();

    let response = app.get(&format!("/api/orders/{order_id}/events")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
