// Pure pricing and promo rules
pub mod pricing;
pub mod promotions;

// Order lifecycle
pub mod order_status;
pub mod orders;

// Payments
pub mod payment_webhooks;
pub mod payments;
