use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::{category, inventory, medicine},
    errors::ServiceError,
};

fn non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_must_not_be_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMedicine {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 200))]
    pub manufacturer: Option<String>,
    #[validate(custom = "non_negative_price")]
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub requires_prescription: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMedicine {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 200))]
    pub manufacturer: Option<String>,
    #[validate(custom = "non_negative_price")]
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub requires_prescription: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct MedicineQuery {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub page: u64,
    pub limit: u64,
}

/// A medicine with the units currently held across its live lots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineWithStock {
    #[serde(flatten)]
    pub medicine: medicine::Model,
    pub stock: i64,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CreateCategory,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let now = Utc::now();

        let existing = category::Entity::find()
            .filter(category::Column::Name.eq(input.name.clone()))
            .one(db)
            .await?;

        let saved = match existing {
            Some(found) if found.deleted_at.is_none() => {
                return Err(ServiceError::Conflict(format!(
                    "Category '{}' already exists",
                    input.name
                )));
            }
            // Names are unique across soft-deleted rows too, so revive the old one
            Some(found) => {
                let mut active: category::ActiveModel = found.into();
                active.description = Set(input.description);
                active.deleted_at = Set(None);
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                category::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(input.name),
                    description: Set(input.description),
                    created_at: Set(now),
                    updated_at: Set(now),
                    deleted_at: Set(None),
                }
                .insert(db)
                .await?
            }
        };

        info!(category_id = %saved.id, "Category saved");
        Ok(saved)
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        let categories = category::Entity::find()
            .filter(category::Column::DeletedAt.is_null())
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(categories)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        id: Uuid,
        input: UpdateCategory,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let found = live_category(db, id).await?;

        if let Some(name) = &input.name {
            let clash = category::Entity::find()
                .filter(category::Column::Name.eq(name.clone()))
                .filter(category::Column::Id.ne(id))
                .one(db)
                .await?;
            if clash.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "Category '{}' already exists",
                    name
                )));
            }
        }

        let mut active: category::ActiveModel = found.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        let found = live_category(db, id).await?;
        let now = Utc::now();
        let mut active: category::ActiveModel = found.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await?;
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_medicine(
        &self,
        input: CreateMedicine,
    ) -> Result<medicine::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        if let Some(category_id) = input.category_id {
            live_category(db, category_id).await?;
        }

        let now = Utc::now();
        let created = medicine::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            manufacturer: Set(input.manufacturer),
            price: Set(input.price),
            category_id: Set(input.category_id),
            requires_prescription: Set(input.requires_prescription),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(db)
        .await?;

        info!(medicine_id = %created.id, "Medicine created");
        Ok(created)
    }

    pub async fn get_medicine(&self, id: Uuid) -> Result<MedicineWithStock, ServiceError> {
        let db = &*self.db;
        let found = live_medicine(db, id).await?;
        let stock = stock_by_medicine(db, &[found.id])
            .await?
            .get(&found.id)
            .copied()
            .unwrap_or(0);
        Ok(MedicineWithStock {
            medicine: found,
            stock,
        })
    }

    /// Lists live medicines by name, filtered by name substring and category
    #[instrument(skip(self))]
    pub async fn list_medicines(
        &self,
        query: MedicineQuery,
    ) -> Result<(Vec<MedicineWithStock>, u64), ServiceError> {
        let db = &*self.db;
        let mut select = medicine::Entity::find()
            .filter(medicine::Column::DeletedAt.is_null())
            .order_by_asc(medicine::Column::Name);
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(medicine::Column::Name.contains(search));
        }
        if let Some(category_id) = query.category_id {
            select = select.filter(medicine::Column::CategoryId.eq(category_id));
        }

        let paginator = select.paginate(db, query.limit);
        let total = paginator.num_items().await?;
        let medicines = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = medicines.iter().map(|m| m.id).collect();
        let stock = stock_by_medicine(db, &ids).await?;
        let items = medicines
            .into_iter()
            .map(|m| {
                let units = stock.get(&m.id).copied().unwrap_or(0);
                MedicineWithStock {
                    medicine: m,
                    stock: units,
                }
            })
            .collect();
        Ok((items, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_medicine(
        &self,
        id: Uuid,
        input: UpdateMedicine,
    ) -> Result<medicine::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let found = live_medicine(db, id).await?;
        if let Some(category_id) = input.category_id {
            live_category(db, category_id).await?;
        }

        let mut active: medicine::ActiveModel = found.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(manufacturer) = input.manufacturer {
            active.manufacturer = Set(Some(manufacturer));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(flag) = input.requires_prescription {
            active.requires_prescription = Set(flag);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_medicine(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        let found = live_medicine(db, id).await?;
        let now = Utc::now();
        let mut active: medicine::ActiveModel = found.into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(db).await?;
        info!(medicine_id = %id, "Medicine soft-deleted");
        Ok(())
    }
}

async fn live_category<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<category::Model, ServiceError> {
    category::Entity::find_by_id(id)
        .filter(category::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Category", id))
}

pub(crate) async fn live_medicine<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<medicine::Model, ServiceError> {
    medicine::Entity::find_by_id(id)
        .filter(medicine::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Medicine", id))
}

/// Units on hand per medicine, summed over non-deleted lots
pub(crate) async fn stock_by_medicine<C: ConnectionTrait>(
    conn: &C,
    medicine_ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, ServiceError> {
    if medicine_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let lots = inventory::Entity::find()
        .filter(inventory::Column::MedicineId.is_in(medicine_ids.to_vec()))
        .filter(inventory::Column::DeletedAt.is_null())
        .all(conn)
        .await?;

    let mut totals = HashMap::new();
    for lot in lots {
        *totals.entry(lot.medicine_id).or_insert(0i64) += i64::from(lot.quantity.max(0));
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_price_fails_validation() {
        let input = CreateMedicine {
            name: "Ibuprofen 200mg".into(),
            description: None,
            manufacturer: None,
            price: dec!(-1.00),
            category_id: None,
            requires_prescription: false,
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
    }

    #[test]
    fn empty_name_fails_validation() {
        let input = CreateCategory {
            name: String::new(),
            description: None,
        };
        assert!(input.validate().is_err());
    }
}
