use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    Json,
};
use tracing::info;

use super::common::{created_response, json_body, success_response};
use crate::{errors::ServiceError, models::checkout::CheckoutRequest, AppState};

/// POST /api/v1/orders
///
/// Places an order from a checkout submission. The response carries
/// `paymentUrl` when the customer must be redirected to pay.
pub async fn create_order(
    State(state): State<AppState>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let request = json_body(body)?;
    let response = state.services.orders.checkout(request).await?;
    info!(order_id = %response.order_id, number = response.number, "Checkout completed");
    Ok(created_response(response))
}

/// POST /api/v1/payments/create
///
/// Same checkout path, kept for clients that start payment explicitly.
pub async fn create_payment(
    State(state): State<AppState>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let request = json_body(body)?;
    let response = state.services.orders.checkout(request).await?;
    Ok(success_response(response))
}
