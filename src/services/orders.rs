use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{DeliveryType, OrderStatus, PaymentStatus},
    errors::ServiceError,
    models::checkout::{CheckoutRequest, CheckoutResponse},
    notifications::{notify_order_placed, NotificationSink},
    repositories::{OrderDraft, OrderRepository, OrderWithItems},
    services::{
        order_status::{parse_status, OrderLifecycle, OrderStatusService, TransitionCause},
        payments::{PaymentProvider, PaymentRequest, PaymentResult},
        pricing,
        promotions::{PromoDecision, PromotionService},
    },
};

/// Settings the checkout needs from the application configuration.
#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    pub public_base_url: String,
    pub store_name: String,
    pub notification_timeout: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            store_name: "Storefront".to_string(),
            notification_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&crate::config::AppConfig> for CheckoutSettings {
    fn from(config: &crate::config::AppConfig) -> Self {
        Self {
            public_base_url: config.public_base_url(),
            store_name: config.store_name.clone(),
            notification_timeout: config.notification_timeout(),
        }
    }
}

/// Amounts the server derived for a checkout submission.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PricedCheckout {
    subtotal: i64,
    discount: i64,
    total: i64,
    promo_code: Option<String>,
}

/// Checkout orchestration and order reads for the storefront.
#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    promotions: PromotionService,
    status: OrderStatusService,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn NotificationSink>,
    settings: CheckoutSettings,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        lifecycle: OrderLifecycle,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationSink>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            orders: OrderRepository::new(db.clone()),
            promotions: PromotionService::new((*db).clone()),
            status: OrderStatusService::new(db, lifecycle),
            payments,
            notifier,
            settings,
        }
    }

    pub fn status_service(&self) -> &OrderStatusService {
        &self.status
    }

    /// Recomputes the totals and checks them against what the client sent.
    async fn price(&self, request: &CheckoutRequest) -> Result<PricedCheckout, ServiceError> {
        let subtotal = pricing::subtotal(&request.items);
        if subtotal != request.subtotal {
            return Err(ServiceError::ValidationError(format!(
                "Subtotal mismatch: expected {}, got {}",
                subtotal, request.subtotal
            )));
        }

        let (discount, promo_code) = match request.promo_code() {
            Some(code) => match self.promotions.validate(code, subtotal).await? {
                PromoDecision::Applied { code, discount, .. } => (discount, Some(code)),
                PromoDecision::Rejected(reason) => {
                    return Err(ServiceError::InvalidOperation(reason.to_string()))
                }
            },
            None => (0, None),
        };

        let client_discount = request.discount.unwrap_or(0);
        if client_discount != discount {
            return Err(ServiceError::ValidationError(format!(
                "Discount mismatch: expected {}, got {}",
                discount, client_discount
            )));
        }

        let total = pricing::total(subtotal, discount);
        if total != request.total {
            return Err(ServiceError::ValidationError(format!(
                "Total mismatch: expected {}, got {}",
                total, request.total
            )));
        }

        Ok(PricedCheckout {
            subtotal,
            discount,
            total,
            promo_code,
        })
    }

    fn draft(
        &self,
        request: &CheckoutRequest,
        priced: PricedCheckout,
    ) -> Result<OrderDraft, ServiceError> {
        let address = match (request.delivery_type, request.address.as_ref()) {
            (DeliveryType::Delivery, Some(address)) => Some(address.encode()?),
            (DeliveryType::Delivery, None) => {
                return Err(ServiceError::InvalidOperation(
                    "Delivery address is required".to_string(),
                ))
            }
            (DeliveryType::Pickup, _) => None,
        };

        Ok(OrderDraft {
            status: OrderLifecycle::initial_status(self.payments.requires_redirect()),
            delivery_type: request.delivery_type,
            customer_name: request.customer_name.trim().to_string(),
            phone: request.phone.trim().to_string(),
            address,
            comment: request.comment(),
            cutlery: request.cutlery.unwrap_or(false),
            subtotal: priced.subtotal,
            discount: priced.discount,
            total: priced.total,
            promo_code: priced.promo_code,
            desired_time: request.desired_time(),
            items: request.items.clone(),
        })
    }

    fn payment_request(&self, order: &OrderWithItems) -> PaymentRequest {
        let o = &order.order;
        PaymentRequest {
            order_id: o.id,
            order_number: o.number,
            amount_cents: o.total,
            description: format!("Order #{} {}", o.number, self.settings.store_name),
            return_url: format!(
                "{}/order/success?id={}&number={}",
                self.settings.public_base_url, o.id, o.number
            ),
            metadata: BTreeMap::new(),
        }
    }

    /// Validates and prices a checkout, persists the order and starts payment.
    ///
    /// A failed payment leaves the order CANCELED and returns
    /// [`ServiceError::PaymentFailed`]; so does a payment the order could not
    /// be linked to, with the underlying error. Without a redirect provider the order
    /// is placed immediately and staff are notified.
    #[instrument(skip(self, request), fields(delivery_type = %request.delivery_type, items = request.items.len()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let priced = self.price(&request).await?;
        let draft = self.draft(&request, priced)?;
        let mut created = self.orders.create_order(draft).await?;
        counter!(
            "storefront_orders_created_total",
            1,
            "status" => created.order.status.to_string()
        );

        let result = self
            .payments
            .create_payment(self.payment_request(&created))
            .await;
        let redirect_url = result.payment_url.clone().filter(|url| !url.is_empty());

        if !result.success || (self.payments.requires_redirect() && redirect_url.is_none()) {
            return Err(self.fail_payment(&created, &result).await);
        }

        let order_id = created.order.id;
        if self.payments.requires_redirect() {
            if let Err(e) = self
                .record_pending_payment(order_id, result.transaction_id.as_deref())
                .await
            {
                error!(%order_id, "Could not record created payment: {}", e);
                self.cancel_unpaid(order_id).await;
                return Err(e);
            }
            info!(%order_id, number = created.order.number, provider = self.payments.name(), "Awaiting payment");
            return Ok(CheckoutResponse {
                order_id,
                number: created.order.number,
                payment_url: redirect_url,
            });
        }

        if let Some(transaction_id) = result.transaction_id.as_deref() {
            match self
                .orders
                .set_payment_reference(order_id, transaction_id, None)
                .await
            {
                Ok(()) => created.order.payment_id = Some(transaction_id.to_string()),
                Err(e) => warn!(%order_id, "Could not store stub payment id: {}", e),
            }
        }
        info!(%order_id, number = created.order.number, "Order placed");
        self.notify(&created).await;

        Ok(CheckoutResponse {
            order_id,
            number: created.order.number,
            payment_url: None,
        })
    }

    /// Bookkeeping after the gateway accepted a redirect payment.
    async fn record_pending_payment(
        &self,
        order_id: Uuid,
        transaction_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Some(transaction_id) = transaction_id {
            self.orders
                .set_payment_reference(order_id, transaction_id, Some(PaymentStatus::Pending))
                .await?;
        }
        self.status
            .transition(order_id, OrderStatus::PendingPayment, TransitionCause::PaymentCreated)
            .await?;
        Ok(())
    }

    async fn fail_payment(&self, created: &OrderWithItems, result: &PaymentResult) -> ServiceError {
        let order_id = created.order.id;
        counter!("storefront_payments_failed_total", 1);
        warn!(
            %order_id,
            provider = self.payments.name(),
            "Payment creation failed: {}",
            result.error_message()
        );
        self.cancel_unpaid(order_id).await;
        ServiceError::PaymentFailed(result.error_message().to_string())
    }

    /// Cancels an order whose payment cannot go ahead. Failures are logged.
    async fn cancel_unpaid(&self, order_id: Uuid) {
        if let Err(e) = self
            .status
            .transition(order_id, OrderStatus::Canceled, TransitionCause::PaymentFailed)
            .await
        {
            error!(%order_id, "Failed to cancel order after payment failure: {}", e);
            return;
        }
        if let Err(e) = self.orders.set_payment_status(order_id, PaymentStatus::Canceled).await {
            warn!(%order_id, "Failed to mark payment canceled: {}", e);
        }
    }

    /// Best-effort staff notification for an order that reached NEW.
    pub async fn notify(&self, order: &OrderWithItems) {
        notify_order_placed(
            self.notifier.as_ref(),
            order,
            self.settings.notification_timeout,
        )
        .await;
    }

    /// Same as [`notify`](Self::notify) without holding up the caller.
    pub fn notify_in_background(&self, order: OrderWithItems) {
        let service = self.clone();
        tokio::spawn(async move { service.notify(&order).await });
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        self.orders
            .find_with_items(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Orders newest first. `status` must be one of the six wire values when given.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, status: Option<&str>) -> Result<Vec<OrderWithItems>, ServiceError> {
        let status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_status)
            .transpose()?;
        self.orders.list_by_status(status).await
    }

    /// Admin status change; returns the order with its items.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        raw_status: &str,
    ) -> Result<OrderWithItems, ServiceError> {
        self.status.admin_update(order_id, raw_status).await?;
        self.get_order(order_id).await
    }
}
