#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use storefront_api::{
    app_router,
    config::AppConfig,
    db,
    notifications::{NotificationError, NotificationSink},
    repositories::OrderWithItems,
    services::payments::{
        PaymentError, PaymentProvider, PaymentRequest, PaymentResult, StubProvider,
    },
    AppState,
};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Notification sink that remembers which order numbers it was given.
#[derive(Default)]
pub struct RecordingSink {
    numbers: Mutex<Vec<i64>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Takes `delay` before recording each notification.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn numbers(&self) -> Vec<i64> {
        self.numbers.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.numbers.lock().unwrap().len()
    }

    /// Waits until at least `expected` notifications arrived, for up to two seconds.
    pub async fn wait_for(&self, expected: usize) -> usize {
        for _ in 0..100 {
            if self.count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn order_placed(&self, order: &OrderWithItems) -> Result<(), NotificationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.numbers.lock().unwrap().push(order.order.number);
        if self.fail {
            return Err(NotificationError::Rejected {
                status: 500,
                body: "sink down".into(),
            });
        }
        Ok(())
    }
}

/// How a [`ScriptedProvider`] answers `create_payment`.
#[derive(Clone, Debug)]
pub enum Script {
    /// Success with a redirect URL per order number.
    Redirect,
    /// Failure with the given message.
    Fail(String),
    /// Success but without any URL to redirect to.
    NoUrl,
}

/// Redirect-style provider with canned answers.
pub struct ScriptedProvider {
    script: Script,
    check: Mutex<Option<PaymentResult>>,
    gateway_down: Mutex<bool>,
    requests: Mutex<Vec<PaymentRequest>>,
    checked: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            check: Mutex::new(None),
            gateway_down: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
            checked: Mutex::new(Vec::new()),
        }
    }

    pub fn answer_checks_with(&self, result: PaymentResult) {
        *self.check.lock().unwrap() = Some(result);
        *self.gateway_down.lock().unwrap() = false;
    }

    /// Status checks fail as if the gateway were unavailable.
    pub fn fail_checks(&self) {
        *self.gateway_down.lock().unwrap() = true;
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn checked(&self) -> Vec<String> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn requires_redirect(&self) -> bool {
        true
    }

    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult {
        let number = request.order_number;
        self.requests.lock().unwrap().push(request);
        match &self.script {
            Script::Redirect => PaymentResult::succeeded(
                format!("pay-{}", number),
                Some(format!("https://pay.test/checkout/{}", number)),
            ),
            Script::Fail(message) => PaymentResult::failed(message.clone()),
            Script::NoUrl => PaymentResult::succeeded(format!("pay-{}", number), None),
        }
    }

    async fn check_payment(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentResult>, PaymentError> {
        self.checked.lock().unwrap().push(transaction_id.to_string());
        if *self.gateway_down.lock().unwrap() {
            return Err(PaymentError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.check.lock().unwrap().clone())
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.admin_token = Some(ADMIN_TOKEN.to_string());
    cfg.public_base_url = Some("https://shop.test".to_string());
    cfg.store_name = "Test Store".to_string();
    cfg
}

/// Helper harness for spinning up the application on an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifications: Arc<RecordingSink>,
}

impl TestApp {
    /// Stub payments, recording notifications.
    pub async fn new() -> Self {
        Self::build(Arc::new(StubProvider), Arc::new(RecordingSink::default()), |_| {}).await
    }

    pub async fn with_provider(provider: Arc<dyn PaymentProvider>) -> Self {
        Self::build(provider, Arc::new(RecordingSink::default()), |_| {}).await
    }

    pub async fn build(
        provider: Arc<dyn PaymentProvider>,
        notifications: Arc<RecordingSink>,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let mut cfg = test_config();
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg, provider, notifications.clone());
        Self {
            router: app_router(state.clone()),
            state,
            notifications,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call failed")
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(build_request(method, uri, body, None)).await
    }

    pub async fn admin_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(build_request(method, uri, body, Some(ADMIN_TOKEN)))
            .await
    }

    pub async fn raw_post(&self, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Places an order through the public endpoint and returns the response body.
    pub async fn checkout(&self, payload: Value) -> (u16, Value) {
        let response = self
            .request(Method::POST, "/api/v1/orders", Some(payload))
            .await;
        let status = response.status().as_u16();
        (status, response_json(response).await)
    }

    pub async fn admin_order(&self, order_id: &str) -> Value {
        let response = self
            .admin_request(Method::GET, &format!("/api/v1/admin/orders/{}", order_id), None)
            .await;
        assert_eq!(response.status(), 200);
        response_json(response).await
    }

    pub async fn admin_orders(&self) -> Vec<Value> {
        let response = self
            .admin_request(Method::GET, "/api/v1/admin/orders", None)
            .await;
        assert_eq!(response.status(), 200);
        response_json(response)
            .await
            .as_array()
            .cloned()
            .unwrap_or_default()
    }
}

fn build_request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    admin_token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = admin_token {
        builder = builder.header("x-admin-token", token);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body bytes")
        .to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

/// Pickup order of two 500.00 ramen bowls, 1000.00 in total.
pub fn pickup_payload() -> Value {
    json!({
        "deliveryType": "PICKUP",
        "customerName": "Anna",
        "phone": "+79990001122",
        "cutlery": true,
        "items": [{
            "productId": "ramen",
            "variantId": null,
            "nameSnapshot": "Ramen",
            "variantSnapshot": null,
            "priceSnapshot": 50000,
            "qty": 2
        }],
        "subtotal": 100000,
        "discount": 0,
        "total": 100000
    })
}

pub fn delivery_payload() -> Value {
    let mut payload = pickup_payload();
    payload["deliveryType"] = json!("DELIVERY");
    payload["address"] = json!({
        "street": "Lenina",
        "building": "12",
        "apartment": "34",
        "floor": "5"
    });
    payload
}

/// Webhook body as the provider sends it for a captured payment.
pub fn succeeded_event(order_id: &str, payment_id: &str) -> Value {
    json!({
        "type": "notification",
        "event": "payment.succeeded",
        "object": {
            "id": payment_id,
            "status": "succeeded",
            "paid": true,
            "metadata": { "orderId": order_id, "orderNumber": "1" }
        }
    })
}
