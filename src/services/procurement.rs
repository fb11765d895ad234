use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    db::transaction,
    entities::{
        inventory, purchase_order,
        purchase_order::PurchaseOrderStatus,
        purchase_order_item,
    },
    errors::ServiceError,
    services::catalog::live_medicine,
};

fn non_negative_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() {
        return Err(ValidationError::new("unit_cost_must_not_be_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLine {
    pub medicine_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "non_negative_cost")]
    pub unit_cost: Decimal,
    #[validate(length(min = 1, max = 100))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchaseOrder {
    #[validate(length(min = 1, max = 200))]
    pub supplier_name: String,
    pub expected_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<PurchaseOrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderDetails {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

#[derive(Clone)]
pub struct ProcurementService {
    db: Arc<DatabaseConnection>,
}

impl ProcurementService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a DRAFT purchase order; its total is Σ unit cost × quantity
    #[instrument(skip(self, input), fields(supplier = %input.supplier_name))]
    pub async fn create(
        &self,
        created_by: Uuid,
        input: CreatePurchaseOrder,
    ) -> Result<PurchaseOrderDetails, ServiceError> {
        input.validate()?;
        for line in &input.items {
            line.validate()?;
        }
        let txn = self.db.begin().await?;
        let result = create_in(&txn, created_by, input).await;
        let details = transaction::finish(txn, result).await?;
        info!(purchase_order_id = %details.purchase_order.id, "Purchase order created");
        Ok(details)
    }

    pub async fn get(&self, id: Uuid) -> Result<PurchaseOrderDetails, ServiceError> {
        let db = &*self.db;
        let po = find_po(db, id).await?;
        let items = po_items(db, id).await?;
        Ok(PurchaseOrderDetails {
            purchase_order: po,
            items,
        })
    }

    pub async fn list(
        &self,
        status: Option<PurchaseOrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let db = &*self.db;
        let mut query =
            purchase_order::Entity::find().order_by_desc(purchase_order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }
        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Moves a purchase order along DRAFT → ORDERED → RECEIVED (or to
    /// CANCELLED). Receiving books one inventory lot per item.
    #[instrument(skip(self), fields(purchase_order_id = %id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let result = transition_in(&txn, id, new_status).await;
        let details = transaction::finish(txn, result).await?;

        if new_status == PurchaseOrderStatus::Received {
            counter!("pharmacy.purchase_orders.received", 1);
        }
        info!("Purchase order {} moved to {}", id, new_status);
        Ok(details)
    }
}

async fn create_in<C: ConnectionTrait>(
    conn: &C,
    created_by: Uuid,
    input: CreatePurchaseOrder,
) -> Result<PurchaseOrderDetails, ServiceError> {
    for line in &input.items {
        live_medicine(conn, line.medicine_id).await?;
    }

    let now = Utc::now();
    let po_id = Uuid::new_v4();
    let total: Decimal = input
        .items
        .iter()
        .map(|line| line.unit_cost * Decimal::from(line.quantity))
        .sum();

    let po = purchase_order::ActiveModel {
        id: Set(po_id),
        supplier_name: Set(input.supplier_name),
        status: Set(PurchaseOrderStatus::Draft),
        expected_date: Set(input.expected_date),
        total: Set(total),
        notes: Set(input.notes),
        created_by: Set(created_by),
        received_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(input.items.len());
    for line in input.items {
        let item = purchase_order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(po_id),
            medicine_id: Set(line.medicine_id),
            quantity: Set(line.quantity),
            unit_cost: Set(line.unit_cost),
            batch_number: Set(line.batch_number),
            expiry_date: Set(line.expiry_date),
        }
        .insert(conn)
        .await?;
        items.push(item);
    }

    Ok(PurchaseOrderDetails {
        purchase_order: po,
        items,
    })
}

async fn transition_in<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    new_status: PurchaseOrderStatus,
) -> Result<PurchaseOrderDetails, ServiceError> {
    let po = find_po(conn, id).await?;
    if !po.status.can_transition_to(new_status) {
        return Err(ServiceError::InvalidStatus(format!(
            "Cannot transition purchase order from {} to {}",
            po.status, new_status
        )));
    }

    let items = po_items(conn, id).await?;
    let now = Utc::now();

    if new_status == PurchaseOrderStatus::Received {
        for item in &items {
            let batch_number = item
                .batch_number
                .clone()
                .unwrap_or_else(|| default_batch_number(id, item.id));
            inventory::ActiveModel {
                id: Set(Uuid::new_v4()),
                medicine_id: Set(item.medicine_id),
                batch_number: Set(batch_number),
                quantity: Set(item.quantity),
                expiry_date: Set(item.expiry_date),
                version: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
                deleted_at: Set(None),
            }
            .insert(conn)
            .await?;
        }
    }

    let mut active: purchase_order::ActiveModel = po.into();
    active.status = Set(new_status);
    if new_status == PurchaseOrderStatus::Received {
        active.received_at = Set(Some(now));
    }
    active.updated_at = Set(now);
    let updated = active.update(conn).await?;

    Ok(PurchaseOrderDetails {
        purchase_order: updated,
        items,
    })
}

fn default_batch_number(po_id: Uuid, item_id: Uuid) -> String {
    let po = po_id.simple().to_string();
    let item = item_id.simple().to_string();
    format!("PO-{}-{}", &po[..8], &item[..4]).to_uppercase()
}

async fn find_po<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    purchase_order::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", id))
}

async fn po_items<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
    Ok(purchase_order_item::Entity::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(id))
        .all(conn)
        .await?)
}
