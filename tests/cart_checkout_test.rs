//! Client cart to placed order: the cart builds the checkout submission and
//! the server agrees with its totals.

mod common;

use common::TestApp;
use serde_json::json;
use storefront_api::{
    entities::DeliveryType,
    models::{cart::Cart, checkout::CheckoutRequest, DeliveryAddress},
    services::pricing::price_lines,
};

fn sample_cart() -> Cart {
    let mut cart = Cart::default();
    cart.add_item("ramen", None, "Ramen", None, 45000);
    cart.add_item("ramen", None, "Ramen", None, 45000);
    cart.add_item(
        "roll",
        Some("big".into()),
        "Roll",
        Some("Big".into()),
        30050,
    );
    cart.cutlery = true;
    cart.comment = "No onions".into();
    cart
}

fn submission(cart: &Cart, discount: i64) -> CheckoutRequest {
    let items = cart.to_checkout_items();
    let totals = price_lines(&items, discount);
    CheckoutRequest {
        delivery_type: cart.delivery_type,
        customer_name: "Boris".into(),
        phone: "+79995554433".into(),
        address: Some(DeliveryAddress {
            street: "Mira".into(),
            building: "7".into(),
            ..Default::default()
        }),
        comment: Some(cart.comment.clone()),
        cutlery: Some(cart.cutlery),
        desired_time: None,
        promo_code: cart.applied_promo.clone(),
        items,
        subtotal: totals.subtotal,
        discount: Some(totals.discount),
        total: totals.total,
    }
}

#[tokio::test]
async fn cart_submission_is_accepted_and_snapshotted() {
    let app = TestApp::new().await;
    let cart = sample_cart();

    let payload = serde_json::to_value(submission(&cart, 0)).unwrap();
    let (status, body) = app.checkout(payload).await;
    assert_eq!(status, 201);

    let order = app.admin_order(body["orderId"].as_str().unwrap()).await;
    assert_eq!(order["subtotal"], 120050);
    assert_eq!(order["total"], 120050);
    assert_eq!(order["comment"], "No onions");
    assert_eq!(order["cutlery"], true);
    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .any(|i| i["variantSnapshot"] == "Big" && i["qty"] == 1));
    assert!(items
        .iter()
        .any(|i| i["productId"] == "ramen" && i["qty"] == 2));
}

#[tokio::test]
async fn cart_with_reserved_promo_places_discounted_order() {
    let app = TestApp::new().await;
    let mut cart = sample_cart();
    cart.applied_promo = Some("FIRST10".into());

    // 10% of 1200.50, rounded half-up
    let payload = serde_json::to_value(submission(&cart, 12005)).unwrap();
    let (status, body) = app.checkout(payload).await;
    assert_eq!(status, 201, "{}", body);

    let order = app.admin_order(body["orderId"].as_str().unwrap()).await;
    assert_eq!(order["discount"], 12005);
    assert_eq!(order["total"], 108045);
    assert_eq!(order["promoCode"], "FIRST10");
}

#[tokio::test]
async fn pickup_cart_drops_address() {
    let app = TestApp::new().await;
    let mut cart = sample_cart();
    cart.delivery_type = DeliveryType::Pickup;

    let payload = serde_json::to_value(submission(&cart, 0)).unwrap();
    let (status, body) = app.checkout(payload).await;
    assert_eq!(status, 201);

    let order = app.admin_order(body["orderId"].as_str().unwrap()).await;
    assert_eq!(order["deliveryType"], "PICKUP");
    assert_eq!(order["address"], json!(null));
}

#[tokio::test]
async fn emptied_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let mut cart = sample_cart();
    cart.update_qty("ramen", None, -2);
    cart.remove_item("roll", Some("big"));
    assert!(cart.items.is_empty());

    let payload = serde_json::to_value(submission(&cart, 0)).unwrap();
    let (status, body) = app.checkout(payload).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Bad Request");
    assert!(app.admin_orders().await.is_empty());
}
