//! Guest checkout driven over HTTP, from cart to confirmation page.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use threadline_integration_tests::fakes::TRACKING_NUMBER;
use threadline_integration_tests::{PUBLISHABLE_KEY, TestApp, address_json, decimal};

#[tokio::test]
async fn test_guest_checkout_end_to_end() {
    let app = TestApp::default();

    let cart = app.add_to_cart("linen-shirt", 2, Some("M")).await;
    assert_eq!(cart.status, StatusCode::OK);
    let cart = cart.json();
    assert_eq!(cart["itemCount"], 2);
    assert_eq!(decimal(&cart["subtotal"]), Decimal::from(100));

    let payment = app.checkout_to_payment("ada@example.com").await;
    assert_eq!(payment["paymentIntentId"], "pi_fake_1");
    assert_eq!(payment["clientSecret"], "pi_fake_1_secret_test");
    assert_eq!(payment["publishableKey"], PUBLISHABLE_KEY);

    // 2 x 50 + 5% tax + 3 ground shipping
    let intents = app.payments.created();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].amount, 10_800);
    assert_eq!(intents[0].receipt_email.as_deref(), Some("ada@example.com"));
    assert_eq!(intents[0].metadata["user_id"], "guest");
    assert_eq!(app.shipping.rate_requests()[0].weight_kg, Decimal::new(6, 1));

    let done = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await;
    assert_eq!(done.status, StatusCode::OK, "{}", done.text());
    let done = done.json();
    let order_id = done["orderId"].as_str().unwrap().to_owned();
    assert_eq!(
        done["redirectUrl"],
        format!("/checkout/success?order={order_id}")
    );

    let cart = app.get("/api/cart").await.json();
    assert_eq!(cart["items"], json!([]));
    assert_eq!(app.shipping.labels_bought(), 1);

    let orders = app.memory.all_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total, Decimal::from(108));
    assert_eq!(orders[0].tax, Decimal::from(5));
    assert!(orders[0].guest_mode);

    let detail = app.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(detail.status, StatusCode::OK);
    let detail = detail.json();
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["payment_status"], "paid");
    assert_eq!(detail["shipment"]["tracking_number"], TRACKING_NUMBER);
    assert_eq!(detail["tracking_events"].as_array().unwrap().len(), 1);

    let page = app.get(done["redirectUrl"].as_str().unwrap()).await;
    assert_eq!(page.status, StatusCode::OK);
    let html = page.text();
    assert!(html.contains("Thank you for your order"));
    assert!(html.contains(TRACKING_NUMBER));
}

#[tokio::test]
async fn test_other_sessions_need_the_order_email() {
    let app = TestApp::default();
    app.add_to_cart("wool-socks", 1, None).await;
    app.checkout_to_payment("ada@example.com").await;
    let done = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await
        .json();
    let order_id = done["orderId"].as_str().unwrap().to_owned();

    app.clear_cookies();
    let hidden = app.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let wrong = app
        .get(&format!("/api/orders/{order_id}?email=someone@example.com"))
        .await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);

    let shown = app
        .get(&format!("/api/orders/{order_id}?email=ADA@example.com"))
        .await;
    assert_eq!(shown.status, StatusCode::OK);
}

#[tokio::test]
async fn test_switching_rate_after_review_reprices() {
    let app = TestApp::default();
    app.add_to_cart("linen-shirt", 1, Some("L")).await;

    let view = app
        .post_json(
            "/api/checkout/address",
            &json!({ "address": address_json("ada@example.com") }),
        )
        .await
        .json();
    assert_eq!(view["step"], "shipping");
    assert_eq!(view["rates"].as_array().unwrap().len(), 2);

    app.post_json("/api/checkout/rate", &json!({ "rateId": "rate_ground" }))
        .await;
    let review = app.post_empty("/api/checkout/review").await.json();
    assert_eq!(review["step"], "review");
    assert_eq!(decimal(&review["totals"]["total"]), Decimal::from(56));

    let back = app.post_empty("/api/checkout/back").await.json();
    assert_eq!(back["step"], "shipping");

    app.post_json("/api/checkout/rate", &json!({ "rateId": "rate_express" }))
        .await;
    let review = app.post_empty("/api/checkout/review").await.json();
    assert_eq!(decimal(&review["totals"]["shipping"]), Decimal::from(12));
    assert_eq!(decimal(&review["totals"]["total"]), Decimal::from(65));
}

#[tokio::test]
async fn test_invalid_address_lists_field_errors() {
    let app = TestApp::default();
    app.add_to_cart("wool-socks", 1, None).await;

    let mut address = address_json("ada@example.com");
    address["country"] = json!("USA");
    address["phone"] = json!("call me");

    let response = app
        .post_json("/api/checkout/address", &json!({ "address": address }))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json();
    assert!(body["fields"]["country"].is_string());
    assert!(body["fields"]["phone"].is_string());
    assert!(app.shipping.rate_requests().is_empty());
}

#[tokio::test]
async fn test_checkout_with_empty_cart_is_rejected() {
    let app = TestApp::default();
    let response = app
        .post_json(
            "/api/checkout/address",
            &json!({ "address": address_json("ada@example.com") }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.shipping.rate_requests().is_empty());
}

#[tokio::test]
async fn test_complete_before_payment_charges_nothing() {
    let app = TestApp::default();
    app.add_to_cart("wool-socks", 1, None).await;

    let response = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await;
    assert!(response.status.is_client_error(), "{}", response.status);
    assert!(app.memory.all_orders().await.is_empty());
    assert!(app.payments.created().is_empty());
}

#[tokio::test]
async fn test_repeated_payment_request_creates_one_intent() {
    let app = TestApp::default();
    app.add_to_cart("wool-socks", 1, None).await;
    let first = app.checkout_to_payment("ada@example.com").await;

    let again = app.post_empty("/api/checkout/payment").await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.json()["paymentIntentId"], first["paymentIntentId"]);
    assert_eq!(app.payments.created().len(), 1);

    let view = app.get("/api/checkout").await.json();
    assert_eq!(view["step"], "payment");
    assert_eq!(view["payment"]["paymentIntentId"], first["paymentIntentId"]);
}

#[tokio::test]
async fn test_back_from_payment_reuses_the_intent_until_the_cart_changes() {
    let app = TestApp::default();
    app.add_to_cart("linen-shirt", 1, Some("M")).await;
    let first = app.checkout_to_payment("ada@example.com").await;

    let back = app.post_empty("/api/checkout/back").await;
    assert_eq!(back.status, StatusCode::OK, "{}", back.text());
    assert_eq!(back.json()["step"], "review");

    let again = app.post_empty("/api/checkout/payment").await.json();
    assert_eq!(again["paymentIntentId"], first["paymentIntentId"]);
    assert_eq!(app.payments.created().len(), 1);

    app.post_empty("/api/checkout/back").await;
    let added = app.add_to_cart("linen-shirt", 1, Some("M")).await;
    assert_eq!(added.status, StatusCode::OK);

    let repriced = app.post_empty("/api/checkout/payment").await.json();
    assert_ne!(repriced["paymentIntentId"], first["paymentIntentId"]);
    let intents = app.payments.created();
    assert_eq!(intents.len(), 2);
    assert_eq!(intents[1].amount, 10_800);
}

#[tokio::test]
async fn test_cart_is_frozen_while_payment_is_open() {
    let app = TestApp::default();
    app.add_to_cart("linen-shirt", 1, Some("M")).await;
    app.checkout_to_payment("ada@example.com").await;

    let added = app.add_to_cart("wool-socks", 3, None).await;
    assert_eq!(added.status, StatusCode::CONFLICT);

    let done = app
        .post_json(
            "/api/checkout/complete",
            &json!({ "paymentIntentId": "pi_fake_1" }),
        )
        .await;
    assert_eq!(done.status, StatusCode::OK, "{}", done.text());

    let charged = app.payments.created()[0].amount;
    let orders = app.memory.all_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].items.len(), 1);
    assert_eq!(orders[0].total * Decimal::ONE_HUNDRED, Decimal::from(charged));
}

#[tokio::test]
async fn test_create_payment_intent_relays_declines() {
    let app = TestApp::default();

    let ok = app
        .post_json(
            "/api/create-payment-intent",
            &json!({ "amount": "108.00", "email": "ada@example.com" }),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK, "{}", ok.text());
    let ok = ok.json();
    assert_eq!(ok["paymentIntentId"], "pi_fake_1");
    assert_eq!(app.payments.created()[0].amount, 10_800);
    assert_eq!(app.payments.created()[0].metadata["user_id"], "guest");

    let zero = app
        .post_json("/api/create-payment-intent", &json!({ "amount": "0" }))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    app.payments.decline_cards();
    let declined = app
        .post_json("/api/create-payment-intent", &json!({ "amount": "20" }))
        .await;
    assert_eq!(declined.status, StatusCode::PAYMENT_REQUIRED);
    let body = declined.json();
    assert_eq!(body["error"], "Your card was declined.");
    assert_eq!(body["code"], "card_declined");
}
