use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order::Model as OrderModel, OrderStatus},
    errors::ServiceError,
    repositories::OrderRepository,
};

/// What triggered a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionCause {
    /// The provider accepted the payment and returned a redirect.
    PaymentCreated,
    /// The provider refused or could not be reached at checkout.
    PaymentFailed,
    /// The provider reported the payment as succeeded.
    PaymentConfirmed,
    /// A staff member changed the status from the admin panel.
    Admin,
}

/// Parses a wire status, rejecting anything outside the six known values.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.trim().parse::<OrderStatus>().map_err(|_| {
        ServiceError::InvalidStatus(format!(
            "'{}' is not one of {}",
            raw,
            OrderStatus::ALL
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

/// Order lifecycle rules.
///
/// Payment-driven transitions follow a fixed graph. Admin changes are
/// unrestricted unless `strict_admin` is set, in which case they must move
/// forward through fulfillment.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderLifecycle {
    strict_admin: bool,
}

impl OrderLifecycle {
    pub fn new(strict_admin: bool) -> Self {
        Self { strict_admin }
    }

    /// Status a freshly created order starts in.
    pub fn initial_status(payment_redirect: bool) -> OrderStatus {
        if payment_redirect {
            OrderStatus::PendingPayment
        } else {
            OrderStatus::New
        }
    }

    pub fn is_allowed(&self, from: OrderStatus, to: OrderStatus, cause: TransitionCause) -> bool {
        use OrderStatus::*;

        match cause {
            TransitionCause::PaymentCreated => from == PendingPayment && to == PendingPayment,
            TransitionCause::PaymentFailed => matches!(from, PendingPayment | New) && to == Canceled,
            TransitionCause::PaymentConfirmed => from == PendingPayment && to == New,
            TransitionCause::Admin if !self.strict_admin => true,
            TransitionCause::Admin => match (from, to) {
                _ if from == to => true,
                (PendingPayment, Canceled) => true,
                (New, Cooking | Delivery | Done | Canceled) => true,
                (Cooking, Delivery | Done | Canceled) => true,
                (Delivery, Done | Canceled) => true,
                _ => false,
            },
        }
    }

    pub fn check(
        &self,
        from: OrderStatus,
        to: OrderStatus,
        cause: TransitionCause,
    ) -> Result<(), ServiceError> {
        if self.is_allowed(from, to, cause) {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {} to {} ({})",
                from, to, cause
            )))
        }
    }
}

/// Applies lifecycle transitions to stored orders.
#[derive(Clone)]
pub struct OrderStatusService {
    orders: OrderRepository,
    lifecycle: OrderLifecycle,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, lifecycle: OrderLifecycle) -> Self {
        Self {
            orders: OrderRepository::new(db),
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> OrderLifecycle {
        self.lifecycle
    }

    /// Moves an order to `new_status` if the lifecycle allows it from the
    /// status it has right now.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status, cause = %cause))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        cause: TransitionCause,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.orders.find_by_id(order_id).await?.ok_or_else(|| {
            warn!("Order {} not found", order_id);
            ServiceError::NotFound(format!("Order {} not found", order_id))
        })?;

        let old_status = order.status;
        self.lifecycle.check(old_status, new_status, cause).map_err(|e| {
            warn!("Rejected status transition: {}", e);
            e
        })?;

        if old_status == new_status {
            return Ok(order);
        }

        // Guard against a concurrent writer (webhook or another admin) in between
        if !self
            .orders
            .compare_and_set_status(order_id, old_status, new_status)
            .await?
        {
            error!(
                "Order {} changed while moving from {} to {}",
                order_id, old_status, new_status
            );
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} was modified concurrently; reload and retry",
                order_id
            )));
        }

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Admin status change from a raw wire value.
    pub async fn admin_update(&self, order_id: Uuid, raw_status: &str) -> Result<OrderModel, ServiceError> {
        let status = parse_status(raw_status)?;
        self.transition(order_id, status, TransitionCause::Admin).await
    }
}
