use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{inventory, medicine},
    errors::ServiceError,
    services::{
        allocation::fifo_key,
        catalog::{live_medicine, stock_by_medicine},
    },
};

/// Widest window the expiring-soon report accepts, matching the config bound
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLot {
    pub medicine_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub batch_number: String,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLot {
    #[validate(length(min = 1, max = 100))]
    pub batch_number: Option<String>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSummary {
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub total_quantity: i64,
    pub lot_count: usize,
    pub next_expiry: Option<NaiveDate>,
}

/// A lot expiring inside the report window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiringLot {
    #[serde(flatten)]
    pub lot: inventory::Model,
    pub medicine_name: String,
    pub days_remaining: i64,
}

/// Service for lot-level inventory records and stock reports
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    low_stock_threshold: i64,
    expiry_warning_days: i64,
}

impl InventoryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        low_stock_threshold: i64,
        expiry_warning_days: i64,
    ) -> Self {
        Self {
            db,
            low_stock_threshold,
            expiry_warning_days,
        }
    }

    #[instrument(skip(self, input), fields(medicine_id = %input.medicine_id))]
    pub async fn create_lot(&self, input: CreateLot) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        live_medicine(db, input.medicine_id).await?;

        let now = Utc::now();
        let lot = inventory::ActiveModel {
            id: Set(Uuid::new_v4()),
            medicine_id: Set(input.medicine_id),
            batch_number: Set(input.batch_number),
            quantity: Set(input.quantity),
            expiry_date: Set(input.expiry_date),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(db)
        .await?;

        info!(lot_id = %lot.id, quantity = lot.quantity, "Inventory lot created");
        Ok(lot)
    }

    pub async fn get_lot(&self, id: Uuid) -> Result<inventory::Model, ServiceError> {
        inventory::Entity::find_by_id(id)
            .filter(inventory::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory lot", id))
    }

    /// Live lots in allocation order: earliest expiry first, undated last
    pub async fn list_lots(
        &self,
        medicine_id: Option<Uuid>,
    ) -> Result<Vec<inventory::Model>, ServiceError> {
        let mut query = inventory::Entity::find().filter(inventory::Column::DeletedAt.is_null());
        if let Some(medicine_id) = medicine_id {
            query = query.filter(inventory::Column::MedicineId.eq(medicine_id));
        }
        let mut lots = query
            .order_by_asc(inventory::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        lots.sort_by_key(|lot| fifo_key(lot.expiry_date, lot.created_at, lot.id));
        Ok(lots)
    }

    #[instrument(skip(self, input))]
    pub async fn update_lot(
        &self,
        id: Uuid,
        input: UpdateLot,
    ) -> Result<inventory::Model, ServiceError> {
        input.validate()?;
        let found = self.get_lot(id).await?;
        apply_lot_update(&*self.db, found, input).await
    }

    #[instrument(skip(self))]
    pub async fn delete_lot(&self, id: Uuid) -> Result<(), ServiceError> {
        let found = self.get_lot(id).await?;
        let now = Utc::now();
        let mut active: inventory::ActiveModel = found.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;
        info!(lot_id = %id, "Inventory lot soft-deleted");
        Ok(())
    }

    /// Per-medicine totals over live lots, for every live medicine
    pub async fn stock_summary(&self) -> Result<Vec<StockSummary>, ServiceError> {
        let db = &*self.db;
        let medicines = medicine::Entity::find()
            .filter(medicine::Column::DeletedAt.is_null())
            .order_by_asc(medicine::Column::Name)
            .all(db)
            .await?;
        let lots = inventory::Entity::find()
            .filter(inventory::Column::DeletedAt.is_null())
            .all(db)
            .await?;

        Ok(medicines
            .into_iter()
            .map(|m| {
                let own: Vec<&inventory::Model> =
                    lots.iter().filter(|lot| lot.medicine_id == m.id).collect();
                StockSummary {
                    medicine_id: m.id,
                    medicine_name: m.name,
                    total_quantity: own.iter().map(|lot| i64::from(lot.quantity.max(0))).sum(),
                    lot_count: own.len(),
                    next_expiry: own
                        .iter()
                        .filter(|lot| lot.quantity > 0)
                        .filter_map(|lot| lot.expiry_date)
                        .min(),
                }
            })
            .collect())
    }

    /// Medicines whose total stock is below `threshold` (configured default
    /// when `None`)
    pub async fn low_stock(&self, threshold: Option<i64>) -> Result<Vec<StockSummary>, ServiceError> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        Ok(self
            .stock_summary()
            .await?
            .into_iter()
            .filter(|summary| summary.total_quantity < threshold)
            .collect())
    }

    /// Non-empty lots whose expiry falls within `days` of today, including
    /// already expired ones
    pub async fn expiring_soon(&self, days: Option<i64>) -> Result<Vec<ExpiringLot>, ServiceError> {
        let days = days.unwrap_or(self.expiry_warning_days);
        if !(0..=MAX_EXPIRY_WINDOW_DAYS).contains(&days) {
            return Err(ServiceError::ValidationError(format!(
                "days must be between 0 and {}",
                MAX_EXPIRY_WINDOW_DAYS
            )));
        }
        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(days);
        let db = &*self.db;

        let lots = inventory::Entity::find()
            .filter(inventory::Column::DeletedAt.is_null())
            .filter(inventory::Column::Quantity.gt(0))
            .filter(inventory::Column::ExpiryDate.is_not_null())
            .filter(inventory::Column::ExpiryDate.lte(horizon))
            .order_by_asc(inventory::Column::ExpiryDate)
            .all(db)
            .await?;

        let ids: Vec<Uuid> = lots.iter().map(|lot| lot.medicine_id).collect();
        let names: std::collections::HashMap<Uuid, String> = medicine::Entity::find()
            .filter(medicine::Column::Id.is_in(ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();

        Ok(lots
            .into_iter()
            .filter_map(|lot| {
                let expiry = lot.expiry_date?;
                Some(ExpiringLot {
                    medicine_name: names.get(&lot.medicine_id).cloned().unwrap_or_default(),
                    days_remaining: (expiry - today).num_days(),
                    lot,
                })
            })
            .collect())
    }

    /// Current stock for one medicine
    pub async fn medicine_stock(&self, medicine_id: Uuid) -> Result<i64, ServiceError> {
        Ok(stock_by_medicine(&*self.db, &[medicine_id])
            .await?
            .get(&medicine_id)
            .copied()
            .unwrap_or(0))
    }
}

/// Writes `input` over the lot as it was read. The write is keyed on the
/// version seen in `found`; a lot changed since then yields `Conflict`.
pub(crate) async fn apply_lot_update<C: ConnectionTrait>(
    conn: &C,
    found: inventory::Model,
    input: UpdateLot,
) -> Result<inventory::Model, ServiceError> {
    let id = found.id;
    let version = found.version;

    let mut active = inventory::ActiveModel {
        version: Set(version + 1),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    if let Some(batch_number) = input.batch_number {
        active.batch_number = Set(batch_number);
    }
    if let Some(quantity) = input.quantity {
        active.quantity = Set(quantity);
    }
    if let Some(expiry_date) = input.expiry_date {
        active.expiry_date = Set(Some(expiry_date));
    }

    let result = inventory::Entity::update_many()
        .set(active)
        .filter(inventory::Column::Id.eq(id))
        .filter(inventory::Column::Version.eq(version))
        .filter(inventory::Column::DeletedAt.is_null())
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        warn!(lot_id = %id, version, "Inventory lot changed before update");
        return Err(ServiceError::Conflict(format!(
            "Inventory lot {} was modified concurrently",
            id
        )));
    }

    inventory::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Inventory lot", id))
}
