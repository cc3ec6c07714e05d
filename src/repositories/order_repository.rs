use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set, SqlErr, Statement,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel,
};
use crate::entities::order_item::{
    ActiveModel as OrderItemActiveModel, Entity as OrderItem, Model as OrderItemModel,
};
use crate::entities::{DeliveryType, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::models::checkout::CheckoutItem;
use crate::repositories::Repository;

use super::BaseRepository;

/// Transaction-scoped advisory lock key serializing order numbering on Postgres.
const ORDER_NUMBER_LOCK_KEY: i64 = 0x4f52_4445_524e_4f;

/// Attempts before a numbering collision or a busy database is reported as an error.
const MAX_NUMBERING_ATTEMPTS: usize = 5;

/// Base delay between attempts after SQLite reported the database busy.
const BUSY_BACKOFF: Duration = Duration::from_millis(25);

/// SQLite allows one writer per file, and a deferred transaction that reads
/// before writing fails with SQLITE_BUSY when two pool connections race to
/// upgrade. Numbering units in this process queue here instead.
static SQLITE_NUMBERING: Mutex<()> = Mutex::const_new(());

/// True for SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
fn is_busy(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return false,
    };
    let RuntimeErr::SqlxError(e) = runtime else {
        return false;
    };
    e.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .map_or(false, |code| matches!(code & 0xff, 5 | 6))
}

/// Everything needed to persist a new order; id and number are assigned on insert.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub status: OrderStatus,
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub phone: String,
    pub address: Option<String>,
    pub comment: Option<String>,
    pub cutlery: bool,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub promo_code: Option<String>,
    pub desired_time: Option<String>,
    pub items: Vec<CheckoutItem>,
}

/// An order row together with its line items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// Repository for order operations
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Highest existing number plus one, or 1 for an empty table.
    ///
    /// Only meaningful inside the transaction that also inserts the order.
    pub async fn next_order_number<C: ConnectionTrait>(conn: &C) -> Result<i64, DbErr> {
        let last: Option<i64> = Order::find()
            .select_only()
            .column(Column::Number)
            .order_by_desc(Column::Number)
            .into_tuple()
            .one(conn)
            .await?;
        Ok(last.unwrap_or(0) + 1)
    }

    async fn lock_numbering<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
        match conn.get_database_backend() {
            DbBackend::Postgres => {
                conn.execute(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    "SELECT pg_advisory_xact_lock($1)",
                    [ORDER_NUMBER_LOCK_KEY.into()],
                ))
                .await?;
            }
            // A no-op write takes the RESERVED lock before the MAX(number)
            // read, so other writers make us wait instead of deadlocking.
            DbBackend::Sqlite => {
                conn.execute(Statement::from_string(
                    DbBackend::Sqlite,
                    "UPDATE orders SET number = number WHERE 0",
                ))
                .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn insert_once(&self, draft: &OrderDraft) -> Result<OrderWithItems, DbErr> {
        let db = self.base.get_db();
        let _guard = match db.get_database_backend() {
            DbBackend::Sqlite => Some(SQLITE_NUMBERING.lock().await),
            _ => None,
        };

        let txn = db.begin().await?;
        Self::lock_numbering(&txn).await?;

        let number = Self::next_order_number(&txn).await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = OrderActiveModel {
            id: Set(order_id),
            number: Set(number),
            status: Set(draft.status),
            delivery_type: Set(draft.delivery_type),
            customer_name: Set(draft.customer_name.clone()),
            phone: Set(draft.phone.clone()),
            address: Set(draft.address.clone()),
            comment: Set(draft.comment.clone()),
            cutlery: Set(draft.cutlery),
            subtotal: Set(draft.subtotal),
            discount: Set(draft.discount),
            total: Set(draft.total),
            promo_code: Set(draft.promo_code.clone()),
            desired_time: Set(draft.desired_time.clone()),
            payment_id: Set(None),
            payment_status: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let items: Vec<OrderItemModel> = draft
            .items
            .iter()
            .map(|item| OrderItemModel {
                id: Uuid::new_v4(),
                order_id,
                product_id: item.product_id.clone(),
                variant_id: item.variant_id.clone(),
                name_snapshot: item.name_snapshot.clone(),
                variant_snapshot: item.variant_snapshot.clone(),
                price_snapshot: item.price_snapshot,
                qty: item.qty,
            })
            .collect();

        if !items.is_empty() {
            let rows = items.iter().map(|item| OrderItemActiveModel {
                id: Set(item.id),
                order_id: Set(item.order_id),
                product_id: Set(item.product_id.clone()),
                variant_id: Set(item.variant_id.clone()),
                name_snapshot: Set(item.name_snapshot.clone()),
                variant_snapshot: Set(item.variant_snapshot.clone()),
                price_snapshot: Set(item.price_snapshot),
                qty: Set(item.qty),
            });
            OrderItem::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(OrderWithItems { order, items })
    }

    /// Persists an order and its items atomically under the next order number.
    ///
    /// Numbering and insertion share one transaction. A unique index on
    /// `orders.number` rejects any duplicate that slips through, in which case
    /// the whole unit is retried with a fresh number. A busy SQLite database
    /// is retried the same way after a short backoff.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<OrderWithItems, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.insert_once(&draft).await {
                Ok(created) => {
                    info!(
                        order_id = %created.order.id,
                        number = created.order.number,
                        status = %created.order.status,
                        "Order persisted"
                    );
                    return Ok(created);
                }
                Err(err)
                    if attempt < MAX_NUMBERING_ATTEMPTS
                        && matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    warn!(attempt, "Order number collision, retrying: {}", err);
                }
                Err(err) if attempt < MAX_NUMBERING_ATTEMPTS && is_busy(&err) => {
                    warn!(attempt, "Database busy while numbering order, retrying: {}", err);
                    tokio::time::sleep(BUSY_BACKOFF * attempt as u32).await;
                }
                Err(err) => return Err(ServiceError::DatabaseError(err)),
            }
        }
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).one(self.base.get_db()).await?)
    }

    /// Find an order with its line items
    pub async fn find_with_items(&self, id: Uuid) -> Result<Option<OrderWithItems>, ServiceError> {
        let found = Order::find_by_id(id)
            .find_with_related(OrderItem)
            .all(self.base.get_db())
            .await?;
        Ok(found
            .into_iter()
            .next()
            .map(|(order, items)| OrderWithItems { order, items }))
    }

    /// Orders newest first, optionally restricted to one status.
    pub async fn list_by_status(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let mut query = Order::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        let rows = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Number)
            .find_with_related(OrderItem)
            .all(self.base.get_db())
            .await?;
        debug!(count = rows.len(), ?status, "Listed orders");
        Ok(rows
            .into_iter()
            .map(|(order, items)| OrderWithItems { order, items })
            .collect())
    }

    /// Overwrites the status. Legality is the caller's concern.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let Some(order) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut active: OrderActiveModel = order.into();
        active.status = Set(status);
        Ok(Some(active.update(self.base.get_db()).await?))
    }

    /// Sets the status only if the row still has `expected`. Returns whether it did.
    pub async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        status: OrderStatus,
    ) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .set(OrderActiveModel {
                status: Set(status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(expected))
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Moves a PENDING_PAYMENT order to NEW with a succeeded payment.
    /// Returns false when the order was not pending, so repeats are no-ops.
    pub async fn confirm_payment(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .set(OrderActiveModel {
                status: Set(OrderStatus::New),
                payment_status: Set(Some(PaymentStatus::Succeeded)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(OrderStatus::PendingPayment))
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Overwrites the provider-reported payment state only.
    pub async fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<(), ServiceError> {
        Order::update_many()
            .set(OrderActiveModel {
                payment_status: Set(Some(payment_status)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .exec(self.base.get_db())
            .await?;
        Ok(())
    }

    /// Records the provider's transaction reference.
    pub async fn set_payment_reference(
        &self,
        id: Uuid,
        payment_id: &str,
        payment_status: Option<PaymentStatus>,
    ) -> Result<(), ServiceError> {
        Order::update_many()
            .set(OrderActiveModel {
                payment_id: Set(Some(payment_id.to_string())),
                payment_status: Set(payment_status),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(Column::Id.eq(id))
            .exec(self.base.get_db())
            .await?;
        Ok(())
    }
}
