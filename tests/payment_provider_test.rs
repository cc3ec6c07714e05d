//! HTTP contracts of the YooKassa provider and the Telegram sink.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use chrono::Utc;
use serde_json::json;
use storefront_api::{
    entities::{order, order_item, DeliveryType, OrderStatus},
    notifications::{NotificationError, NotificationSink, TelegramNotifier},
    repositories::OrderWithItems,
    services::payments::{PaymentError, PaymentProvider, PaymentRequest, YooKassaProvider},
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> YooKassaProvider {
    YooKassaProvider::new(
        &server.uri(),
        "shop",
        "secret",
        "RUB",
        Duration::from_secs(2),
    )
    .unwrap()
}

fn payment_request(order_id: Uuid) -> PaymentRequest {
    PaymentRequest {
        order_id,
        order_number: 7,
        amount_cents: 90000,
        description: "Order #7 Test Store".into(),
        return_url: format!("https://shop.test/order/success?id={}&number=7", order_id),
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn create_payment_sends_redirect_request_with_credentials() {
    let server = MockServer::start().await;
    let order_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/payments"))
        .and(header("authorization", "Basic c2hvcDpzZWNyZXQ="))
        .and(header_exists("Idempotence-Key"))
        .and(body_partial_json(json!({
            "amount": { "value": "900.00", "currency": "RUB" },
            "capture": true,
            "confirmation": { "type": "redirect" },
            "description": "Order #7 Test Store",
            "metadata": { "orderId": order_id.to_string(), "orderNumber": "7" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "2c5d-yk",
            "status": "pending",
            "confirmation": {
                "type": "redirect",
                "confirmation_url": "https://yoomoney.test/checkout?orderId=2c5d-yk"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider(&server)
        .create_payment(payment_request(order_id))
        .await;
    assert!(result.success);
    assert_eq!(result.transaction_id.as_deref(), Some("2c5d-yk"));
    assert_eq!(
        result.payment_url.as_deref(),
        Some("https://yoomoney.test/checkout?orderId=2c5d-yk")
    );
}

#[tokio::test]
async fn gateway_error_status_becomes_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "type": "error" })))
        .mount(&server)
        .await;

    let result = provider(&server)
        .create_payment(payment_request(Uuid::new_v4()))
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Payment system error: 401"));
    assert!(result.payment_url.is_none());
}

#[tokio::test]
async fn response_without_confirmation_url_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "p1", "status": "pending" })),
        )
        .mount(&server)
        .await;

    let result = provider(&server)
        .create_payment(payment_request(Uuid::new_v4()))
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("confirmation URL"));
}

#[tokio::test]
async fn unreachable_gateway_is_a_failure_not_a_panic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let result = provider(&server)
        .create_payment(payment_request(Uuid::new_v4()))
        .await;
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn check_payment_reports_gateway_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/p-ok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "p-ok", "status": "succeeded" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/p-wait"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "p-wait", "status": "waiting_for_capture" })),
        )
        .mount(&server)
        .await;

    let provider = provider(&server);
    let ok = provider.check_payment("p-ok").await.unwrap().unwrap();
    assert!(ok.success);
    assert_eq!(ok.transaction_id.as_deref(), Some("p-ok"));

    let waiting = provider.check_payment("p-wait").await.unwrap().unwrap();
    assert!(!waiting.success);
    assert_eq!(waiting.error.as_deref(), Some("waiting_for_capture"));
}

#[tokio::test]
async fn check_payment_separates_refusal_from_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/p-missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/p-busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let missing = provider.check_payment("p-missing").await.unwrap().unwrap();
    assert!(!missing.success);

    let err = provider.check_payment("p-busy").await.unwrap_err();
    assert!(matches!(err, PaymentError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn check_payment_against_unreachable_gateway_is_an_error() {
    let provider = YooKassaProvider::new(
        "http://127.0.0.1:1",
        "shop",
        "secret",
        "RUB",
        Duration::from_secs(2),
    )
    .unwrap();

    let err = provider.check_payment("p-1").await.unwrap_err();
    assert!(matches!(err, PaymentError::Transport(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn verified_webhook_survives_a_gateway_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "yk-1",
            "status": "pending",
            "confirmation": { "type": "redirect", "confirmation_url": "https://yoomoney.test/c/yk-1" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/yk-1"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/yk-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "yk-1", "status": "succeeded" })),
        )
        .mount(&server)
        .await;

    let app = common::TestApp::build(
        Arc::new(provider(&server)),
        Arc::new(common::RecordingSink::default()),
        |cfg| cfg.payment_webhook_verify = true,
    )
    .await;
    let (status, body) = app.checkout(common::pickup_payload()).await;
    assert_eq!(status, 201);
    let order_id = body["orderId"].as_str().unwrap().to_string();
    let event = common::succeeded_event(&order_id, "yk-1");

    let first = app
        .request(Method::POST, "/api/v1/payments/webhook", Some(event.clone()))
        .await;
    assert_eq!(first.status(), 502);
    assert_eq!(app.admin_order(&order_id).await["status"], "PENDING_PAYMENT");

    let redelivered = app
        .request(Method::POST, "/api/v1/payments/webhook", Some(event))
        .await;
    assert_eq!(redelivered.status(), 200);
    let order = app.admin_order(&order_id).await;
    assert_eq!(order["status"], "NEW");
    assert_eq!(order["paymentStatus"], "SUCCEEDED");
}

#[tokio::test]
async fn redirect_checkout_end_to_end_against_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "yk-1",
            "status": "pending",
            "confirmation": { "type": "redirect", "confirmation_url": "https://yoomoney.test/c/yk-1" }
        })))
        .mount(&server)
        .await;

    let app = common::TestApp::with_provider(Arc::new(provider(&server))).await;
    let (status, body) = app.checkout(common::pickup_payload()).await;
    assert_eq!(status, 201);
    assert_eq!(body["paymentUrl"], "https://yoomoney.test/c/yk-1");

    let order = app.admin_order(body["orderId"].as_str().unwrap()).await;
    assert_eq!(order["status"], "PENDING_PAYMENT");
    assert_eq!(order["paymentId"], "yk-1");
}

fn placed_order() -> OrderWithItems {
    let id = Uuid::new_v4();
    OrderWithItems {
        order: order::Model {
            id,
            number: 12,
            status: OrderStatus::New,
            delivery_type: DeliveryType::Pickup,
            customer_name: "Anna".into(),
            phone: "+79990001122".into(),
            address: None,
            comment: None,
            cutlery: false,
            subtotal: 45000,
            discount: 0,
            total: 45000,
            promo_code: None,
            desired_time: None,
            payment_id: None,
            payment_status: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        items: vec![order_item::Model {
            id: Uuid::new_v4(),
            order_id: id,
            product_id: "ramen".into(),
            variant_id: None,
            name_snapshot: "Ramen".into(),
            variant_snapshot: None,
            price_snapshot: 45000,
            qty: 1,
        }],
    }
}

#[tokio::test]
async fn telegram_sink_posts_message_to_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "-100500" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = TelegramNotifier::new(
        &server.uri(),
        "TOKEN",
        "-100500",
        "RUB",
        Duration::from_secs(2),
    )
    .unwrap();
    sink.order_placed(&placed_order()).await.unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let text = body["text"].as_str().unwrap();
    assert!(text.starts_with("New order #12"));
    assert!(text.contains("Ramen × 1 — 450 RUB"));
}

#[tokio::test]
async fn telegram_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
        .mount(&server)
        .await;

    let sink = TelegramNotifier::new(&server.uri(), "T", "1", "RUB", Duration::from_secs(2)).unwrap();
    let err = sink.order_placed(&placed_order()).await.unwrap_err();
    assert!(matches!(err, NotificationError::Rejected { status: 400, .. }));
}
