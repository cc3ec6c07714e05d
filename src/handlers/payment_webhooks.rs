use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{errors::ServiceError, AppState};

// POST /api/v1/payments/webhook
//
// Always acknowledged so the provider does not retry benign events.
// Persistence failures and an unreachable gateway during verification are the
// exception: the error status makes the provider redeliver.
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let outcome = state
        .services
        .webhooks
        .handle_raw(&body)
        .await
        .map_err(|e| {
            error!("Payment webhook processing failed: {}", e);
            e
        })?;
    info!(outcome = outcome.label(), "Payment webhook handled");
    Ok(Json(json!({ "received": true })))
}
