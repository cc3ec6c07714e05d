pub mod admin;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod promo;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    notifications::NotificationSink,
    services::{
        order_status::OrderLifecycle,
        orders::{CheckoutSettings, OrderService},
        payment_webhooks::PaymentWebhookService,
        payments::PaymentProvider,
        promotions::PromotionService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub promotions: Arc<PromotionService>,
    pub webhooks: Arc<PaymentWebhookService>,
}

impl AppServices {
    /// Wires the services around one payment provider and one notification sink.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        payment_provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let orders = OrderService::new(
            db_pool.clone(),
            OrderLifecycle::new(config.admin_strict_transitions),
            payment_provider.clone(),
            notifier,
            CheckoutSettings::from(config),
        );
        let webhooks = PaymentWebhookService::new(
            db_pool.clone(),
            orders.clone(),
            payment_provider,
            config.payment_webhook_verify,
        );

        Self {
            orders: Arc::new(orders),
            promotions: Arc::new(PromotionService::new((*db_pool).clone())),
            webhooks: Arc::new(webhooks),
        }
    }
}
