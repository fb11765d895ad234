use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::transaction,
    entities::{
        inventory, order,
        order::OrderStatus,
        order_item, order_item_lot, payment,
        payment::PaymentStatus,
    },
    errors::ServiceError,
};

/// Whether an order may move from `from` to `to`.
///
/// PENDING may be paid, cancelled or rejected; PAID may be packed or cancelled;
/// PACKED may be delivered. DELIVERED, CANCELLED and REJECTED are terminal.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Paid)
            | (Pending, Cancelled)
            | (Pending, Rejected)
            | (Paid, Packed)
            | (Paid, Cancelled)
            | (Packed, Delivered)
    )
}

/// DELIVERED, CANCELLED and REJECTED accept no further transitions
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rejected
    )
}

/// Outcome of a status change, for auditing
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    #[serde(flatten)]
    pub order: order::Model,
    #[serde(rename = "previous_status")]
    pub previous: OrderStatus,
    pub units_restocked: i64,
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Moves an order to `new_status` and applies the payment and stock side
    /// effects in the same transaction.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<StatusChange, ServiceError> {
        let txn = self.db.begin().await?;
        let result = transition(&txn, order_id, new_status, None).await;
        let change = transaction::finish(txn, result).await?;

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, change.previous, new_status
        );
        counter!("pharmacy.orders.status_changed", 1);
        Ok(change)
    }

    /// Cancels an order on behalf of the customer who placed it. Only PENDING
    /// orders can be cancelled this way.
    #[instrument(skip(self), fields(order_id = %order_id, user_id = %user_id))]
    pub async fn cancel_own(&self, order_id: Uuid, user_id: Uuid) -> Result<StatusChange, ServiceError> {
        let txn = self.db.begin().await?;
        let result = transition(&txn, order_id, OrderStatus::Cancelled, Some(user_id)).await;
        let change = transaction::finish(txn, result).await?;

        info!("Order {} cancelled by its owner", order_id);
        counter!("pharmacy.orders.status_changed", 1);
        Ok(change)
    }
}

async fn transition<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    new_status: OrderStatus,
    owner: Option<Uuid>,
) -> Result<StatusChange, ServiceError> {
    let order = order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

    if let Some(user_id) = owner {
        if order.user_id != user_id {
            // Someone else's order is reported the same as a missing one
            return Err(ServiceError::not_found("Order", order_id));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Only PENDING orders can be cancelled by the customer; order is {}",
                order.status
            )));
        }
    }

    apply_transition(conn, order, new_status).await
}

/// Claims the move from the status `order` was read with, then applies the
/// side effects. A concurrent transition that got there first makes the claim
/// miss and yields `Conflict`, so restock and refund run at most once.
pub(crate) async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    new_status: OrderStatus,
) -> Result<StatusChange, ServiceError> {
    let order_id = order.id;
    let previous = order.status;
    if !is_valid_transition(previous, new_status) {
        error!("Invalid status transition from {} to {}", previous, new_status);
        let message = if is_terminal(previous) {
            format!("Order is already {}", previous)
        } else {
            format!("Cannot transition from {} to {}", previous, new_status)
        };
        return Err(ServiceError::InvalidStatus(message));
    }

    let claimed = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(new_status))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(previous))
        .exec(conn)
        .await?;
    if claimed.rows_affected == 0 {
        warn!(order_id = %order_id, "Order status changed underneath transition");
        return Err(ServiceError::Conflict(format!(
            "Order {} changed status concurrently",
            order_id
        )));
    }

    let mut units_restocked = 0;
    match new_status {
        OrderStatus::Paid => {
            set_payment_status(conn, order_id, |_| PaymentStatus::Completed).await?;
        }
        OrderStatus::Cancelled | OrderStatus::Rejected => {
            units_restocked = restock(conn, order_id).await?;
            set_payment_status(conn, order_id, |current| match current {
                PaymentStatus::Completed => PaymentStatus::Refunded,
                _ => PaymentStatus::Cancelled,
            })
            .await?;
        }
        _ => {}
    }

    let updated = order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

    Ok(StatusChange {
        order: updated,
        previous,
        units_restocked,
    })
}

async fn set_payment_status<C, F>(conn: &C, order_id: Uuid, next: F) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
    F: FnOnce(PaymentStatus) -> PaymentStatus,
{
    let Some(existing) = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .one(conn)
        .await?
    else {
        warn!("Order {} has no payment record", order_id);
        return Ok(());
    };

    let status = next(existing.status);
    let mut active: payment::ActiveModel = existing.into();
    active.status = Set(status);
    active.updated_at = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

/// Returns every unit the order drew back to the lot it came from
async fn restock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> Result<i64, ServiceError> {
    let item_ids: Vec<Uuid> = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();

    if item_ids.is_empty() {
        return Ok(0);
    }

    let allocations = order_item_lot::Entity::find()
        .filter(order_item_lot::Column::OrderItemId.is_in(item_ids))
        .all(conn)
        .await?;

    let now = Utc::now();
    let mut restored = 0i64;
    for allocation in allocations {
        inventory::Entity::update_many()
            .col_expr(
                inventory::Column::Quantity,
                Expr::col(inventory::Column::Quantity).add(allocation.quantity),
            )
            .col_expr(
                inventory::Column::Version,
                Expr::col(inventory::Column::Version).add(1),
            )
            .col_expr(inventory::Column::UpdatedAt, Expr::value(now))
            .filter(inventory::Column::Id.eq(allocation.inventory_id))
            .exec(conn)
            .await?;
        restored += i64::from(allocation.quantity);
    }

    Ok(restored)
}
