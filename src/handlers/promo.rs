use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::common::json_body;
use crate::{errors::ServiceError, services::promotions::PromoValidationResponse, AppState};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    #[validate(length(min = 1, message = "Promo code is required"))]
    pub code: String,
    #[validate(range(min = 0, message = "Cart total cannot be negative"))]
    pub cart_total: i64,
}

/// POST /api/v1/promocode/validate
pub async fn validate_promo(
    State(state): State<AppState>,
    body: Result<Json<ValidatePromoRequest>, JsonRejection>,
) -> Result<Json<PromoValidationResponse>, ServiceError> {
    let request = json_body(body)?;
    request.validate()?;
    let decision = state
        .services
        .promotions
        .validate(&request.code, request.cart_total)
        .await?;
    Ok(Json(decision.into()))
}
