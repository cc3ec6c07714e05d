use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::common::{json_body, parse_order_id};
use crate::{errors::ServiceError, repositories::OrderWithItems, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// GET /api/v1/admin/orders?status=
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminOrdersQuery>,
) -> Result<Json<Vec<OrderWithItems>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(query.status.as_deref())
        .await?;
    Ok(Json(orders))
}

/// GET /api/v1/admin/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.services.orders.get_order(order_id).await?))
}

/// PATCH /api/v1/admin/orders/:id/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    let order_id = parse_order_id(&id)?;
    let request = json_body(body)?;
    let order = state
        .services
        .orders
        .update_status(order_id, &request.status)
        .await?;
    info!(%order_id, status = %order.order.status, "Order status set by admin");
    Ok(Json(order))
}
