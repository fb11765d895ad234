use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::transaction,
    entities::{
        inventory, medicine, order,
        order::OrderStatus,
        order_item, order_item_lot, payment,
        payment::PaymentStatus,
    },
    errors::ServiceError,
    services::allocation::{self, LotDeduction, LotSnapshot},
};

const DEFAULT_PAYMENT_METHOD: &str = "MOCK";

/// One cart line as submitted by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub medicine_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PlaceOrder {
    pub items: Vec<OrderLine>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
}

/// An order together with its lines and payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: Option<payment::Model>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

/// A medicine line that passed the stock check, with its deduction plan
pub(crate) struct PlannedLine {
    medicine: medicine::Model,
    quantity: i32,
    deductions: Vec<LotDeduction>,
}

/// Sums quantities of lines naming the same medicine, keeping first-seen order
pub fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, ServiceError> {
    let mut merged: Vec<(Uuid, i64)> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for medicine {} must be at least 1",
                line.medicine_id
            )));
        }
        match index.get(&line.medicine_id) {
            Some(&at) => merged[at].1 += i64::from(line.quantity),
            None => {
                index.insert(line.medicine_id, merged.len());
                merged.push((line.medicine_id, i64::from(line.quantity)));
            }
        }
    }

    merged
        .into_iter()
        .map(|(medicine_id, quantity)| {
            let quantity = i32::try_from(quantity).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "Quantity for medicine {} is too large",
                    medicine_id
                ))
            })?;
            Ok(OrderLine {
                medicine_id,
                quantity,
            })
        })
        .collect()
}

/// Σ price × quantity over the order's lines
pub fn order_total<'a>(items: impl IntoIterator<Item = &'a order_item::Model>) -> Decimal {
    items
        .into_iter()
        .map(|item| item.price * Decimal::from(item.quantity))
        .sum()
}

/// Service for placing and reading orders
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    skip_expired_lots: bool,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, skip_expired_lots: bool) -> Self {
        Self {
            db,
            skip_expired_lots,
        }
    }

    /// Places an order: checks stock for every line, creates the order and its
    /// lines at current prices, drains lots earliest-expiry first and records a
    /// pending payment. Any failure rolls the whole placement back.
    #[instrument(skip(self, input), fields(user_id = %user_id, lines = input.items.len()))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrder,
    ) -> Result<OrderDetails, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }
        let lines = merge_lines(&input.items)?;

        let txn = self.db.begin().await?;
        let result = self.place_in(&txn, user_id, &lines, &input).await;
        let details = match transaction::finish(txn, result).await {
            Ok(details) => details,
            Err(err) => {
                counter!("pharmacy.orders.failed", 1);
                warn!(error = %err, "Order placement aborted");
                return Err(err);
            }
        };

        counter!("pharmacy.orders.placed", 1);
        info!(
            order_id = %details.order.id,
            total = %details.order.total,
            "Order placed"
        );
        Ok(details)
    }

    async fn place_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        lines: &[OrderLine],
        input: &PlaceOrder,
    ) -> Result<OrderDetails, ServiceError> {
        // Check every line before writing anything
        let mut planned = Vec::with_capacity(lines.len());
        for line in lines {
            planned.push(self.plan_line(conn, line).await?);
        }
        apply_plan(conn, user_id, &planned, input).await
    }

    pub(crate) async fn plan_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        line: &OrderLine,
    ) -> Result<PlannedLine, ServiceError> {
        let medicine = medicine::Entity::find_by_id(line.medicine_id)
            .filter(medicine::Column::DeletedAt.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Medicine", line.medicine_id))?;

        let lots = inventory::Entity::find()
            .filter(inventory::Column::MedicineId.eq(medicine.id))
            .filter(inventory::Column::DeletedAt.is_null())
            .all(conn)
            .await?;
        let mut snapshots: Vec<LotSnapshot> = lots.iter().map(LotSnapshot::from).collect();
        if self.skip_expired_lots {
            snapshots = allocation::without_expired(snapshots, Utc::now().date_naive());
        }

        let deductions =
            allocation::plan_fifo_deduction(&snapshots, line.quantity).map_err(|shortfall| {
                ServiceError::InsufficientStock {
                    medicine: medicine.name.clone(),
                    requested: shortfall.requested,
                    available: shortfall.available,
                }
            })?;

        Ok(PlannedLine {
            medicine,
            quantity: line.quantity,
            deductions,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        load_details(db, order).await
    }

    /// Lists orders newest first, optionally restricted to one user or status
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let db = &*self.db;
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }
}

/// Writes the order, its lines and payment for lines that already passed the
/// stock check, draining lots as planned. Fails with `InsufficientStock` when
/// a lot no longer holds its planned quantity; the caller rolls back.
pub(crate) async fn apply_plan<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    planned: &[PlannedLine],
    input: &PlaceOrder,
) -> Result<OrderDetails, ServiceError> {
    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let total: Decimal = planned
        .iter()
        .map(|p| p.medicine.price * Decimal::from(p.quantity))
        .sum();

    let order = order::ActiveModel {
        id: Set(order_id),
        user_id: Set(user_id),
        total: Set(total),
        status: Set(OrderStatus::Pending),
        shipping_address: Set(input.shipping_address.clone()),
        notes: Set(input.notes.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(planned.len());
    for (line_number, line) in (1..).zip(planned) {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            medicine_id: Set(line.medicine.id),
            line_number: Set(line_number),
            quantity: Set(line.quantity),
            price: Set(line.medicine.price),
        }
        .insert(conn)
        .await?;

        for deduction in &line.deductions {
            decrement_lot(conn, &line.medicine, line.quantity, deduction).await?;
            order_item_lot::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_item_id: Set(item.id),
                inventory_id: Set(deduction.lot_id),
                quantity: Set(deduction.quantity),
            }
            .insert(conn)
            .await?;
        }
        items.push(item);
    }

    let payment = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        amount: Set(total),
        method: Set(input
            .payment_method
            .clone()
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string())),
        status: Set(PaymentStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok(OrderDetails {
        order,
        items,
        payment: Some(payment),
    })
}

/// Applies one planned deduction with a guarded decrement. Zero affected rows
/// means the lot was drained since the plan was made.
pub(crate) async fn decrement_lot<C: ConnectionTrait>(
    conn: &C,
    medicine: &medicine::Model,
    requested: i32,
    deduction: &LotDeduction,
) -> Result<(), ServiceError> {
    let result = inventory::Entity::update_many()
        .col_expr(
            inventory::Column::Quantity,
            Expr::col(inventory::Column::Quantity).sub(deduction.quantity),
        )
        .col_expr(
            inventory::Column::Version,
            Expr::col(inventory::Column::Version).add(1),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(deduction.lot_id))
        .filter(inventory::Column::Quantity.gte(deduction.quantity))
        .filter(inventory::Column::DeletedAt.is_null())
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available: i64 = inventory::Entity::find()
            .filter(inventory::Column::MedicineId.eq(medicine.id))
            .filter(inventory::Column::DeletedAt.is_null())
            .all(conn)
            .await?
            .iter()
            .map(|lot| i64::from(lot.quantity.max(0)))
            .sum();
        error!(
            lot_id = %deduction.lot_id,
            medicine = %medicine.name,
            "Lot depleted between stock check and deduction"
        );
        return Err(ServiceError::InsufficientStock {
            medicine: medicine.name.clone(),
            requested: i64::from(requested),
            available,
        });
    }

    Ok(())
}

pub(crate) async fn load_details<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetails, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::LineNumber)
        .all(conn)
        .await?;
    let payment = payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order.id))
        .one(conn)
        .await?;
    Ok(OrderDetails {
        order,
        items,
        payment,
    })
}
