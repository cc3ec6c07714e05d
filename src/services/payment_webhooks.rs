use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    repositories::OrderRepository,
    services::{order_status::TransitionCause, orders::OrderService, payments::PaymentProvider},
};

/// The only provider event that moves an order forward.
pub const PAYMENT_SUCCEEDED_EVENT: &str = "payment.succeeded";

/// Provider notification body. Unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub object: Option<WebhookObject>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl WebhookEvent {
    /// Internal order id carried in the payment metadata, if it parses.
    pub fn order_id(&self) -> Option<Uuid> {
        self.object
            .as_ref()?
            .metadata
            .get("orderId")?
            .as_str()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.object.as_ref()?.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// What a delivery did. Every variant is acknowledged to the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payload unusable or not about a successful payment.
    Ignored(&'static str),
    /// Order already left PENDING_PAYMENT; repeats land here.
    AlreadyProcessed { order_id: Uuid },
    /// Provider did not confirm the payment on re-query.
    Unverified { order_id: Uuid },
    /// Order moved to NEW by this delivery.
    Confirmed { order_id: Uuid, number: i64 },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Ignored(_) => "ignored",
            WebhookOutcome::AlreadyProcessed { .. } => "duplicate",
            WebhookOutcome::Unverified { .. } => "unverified",
            WebhookOutcome::Confirmed { .. } => "confirmed",
        }
    }
}

/// Applies payment provider notifications to orders.
#[derive(Clone)]
pub struct PaymentWebhookService {
    orders: OrderRepository,
    order_service: OrderService,
    payments: Arc<dyn PaymentProvider>,
    verify_with_provider: bool,
}

impl PaymentWebhookService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        order_service: OrderService,
        payments: Arc<dyn PaymentProvider>,
        verify_with_provider: bool,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db),
            order_service,
            payments,
            verify_with_provider,
        }
    }

    /// Handles one raw delivery. Only persistence failures and an unreachable
    /// verification endpoint are errors.
    pub async fn handle_raw(&self, body: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        let outcome = match serde_json::from_slice::<WebhookEvent>(body) {
            Ok(event) => self.handle(event).await?,
            Err(e) => {
                warn!("Malformed payment webhook: {}", e);
                WebhookOutcome::Ignored("malformed")
            }
        };
        counter!("storefront_webhooks_received_total", 1, "outcome" => outcome.label());
        Ok(outcome)
    }

    #[instrument(skip(self, event), fields(event = %event.event))]
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome, ServiceError> {
        if event.event != PAYMENT_SUCCEEDED_EVENT {
            debug!("Ignoring payment webhook event");
            return Ok(WebhookOutcome::Ignored("event"));
        }
        let Some(order_id) = event.order_id() else {
            warn!("Payment webhook without a usable orderId");
            return Ok(WebhookOutcome::Ignored("no_order"));
        };

        let Some(order) = self.orders.find_by_id(order_id).await? else {
            warn!(%order_id, "Payment webhook for unknown order");
            return Ok(WebhookOutcome::Ignored("unknown_order"));
        };
        if order.status != OrderStatus::PendingPayment {
            info!(%order_id, status = %order.status, "Order is not awaiting payment; nothing to do");
            return Ok(WebhookOutcome::AlreadyProcessed { order_id });
        }

        if self.verify_with_provider {
            let payment_id = event
                .payment_id()
                .map(str::to_string)
                .or_else(|| order.payment_id.clone());
            if let Some(payment_id) = payment_id {
                match self.payments.check_payment(&payment_id).await {
                    Ok(Some(result)) if !result.success => {
                        warn!(%order_id, %payment_id, "Provider did not confirm payment: {}", result.error_message());
                        return Ok(WebhookOutcome::Unverified { order_id });
                    }
                    Ok(Some(_)) => debug!(%order_id, %payment_id, "Payment confirmed by provider"),
                    Ok(None) => warn!(provider = self.payments.name(), "Provider cannot re-query payments"),
                    // Not acknowledged, so the provider delivers again later
                    Err(e) => {
                        counter!("storefront_webhooks_received_total", 1, "outcome" => "retry");
                        return Err(ServiceError::ExternalServiceError(format!(
                            "Could not verify payment {}: {}",
                            payment_id, e
                        )));
                    }
                }
            }
        }

        self.order_service.status_service().lifecycle().check(
            order.status,
            OrderStatus::New,
            TransitionCause::PaymentConfirmed,
        )?;

        // Concurrent deliveries race here; only one moves the row
        if !self.orders.confirm_payment(order_id).await? {
            info!(%order_id, "Payment already confirmed by a concurrent delivery");
            return Ok(WebhookOutcome::AlreadyProcessed { order_id });
        }
        info!(%order_id, number = order.number, "Payment confirmed, order placed");

        match self.orders.find_with_items(order_id).await {
            Ok(Some(placed)) => self.order_service.notify_in_background(placed),
            Ok(None) => warn!(%order_id, "Order vanished before notification"),
            Err(e) => warn!(%order_id, "Could not load order for notification: {}", e),
        }

        Ok(WebhookOutcome::Confirmed {
            order_id,
            number: order.number,
        })
    }
}
