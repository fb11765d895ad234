use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{entities::audit_log, errors::ServiceError};

/// One audit entry to record
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: Option<Uuid>,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub details: Option<Value>,
}

impl AuditEntry {
    pub fn new(actor: Option<Uuid>, action: &'static str, entity_type: &'static str) -> Self {
        Self {
            actor,
            action,
            entity_type,
            entity_id: None,
            details: None,
        }
    }

    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Append-only audit trail
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DatabaseConnection>,
}

impl AuditService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn try_record(&self, entry: AuditEntry) -> Result<audit_log::Model, ServiceError> {
        let details = entry.details.as_ref().map(Value::to_string);
        let row = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(entry.actor),
            action: Set(entry.action.to_string()),
            entity_type: Set(entry.entity_type.to_string()),
            entity_id: Set(entry.entity_id),
            details: Set(details),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(row)
    }

    /// Records an entry after the action it describes has committed. A failed
    /// write is logged and does not fail the action.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let entity_type = entry.entity_type;
        match self.try_record(entry).await {
            Ok(row) => debug!(audit_id = %row.id, action, entity_type, "Audit entry recorded"),
            Err(e) => {
                counter!("pharmacy.audit.write_failures", 1);
                warn!(error = %e, action, entity_type, "Failed to write audit entry");
            }
        }
    }

    pub async fn list(
        &self,
        filter: AuditFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<audit_log::Model>, u64), ServiceError> {
        let mut query = audit_log::Entity::find().order_by_desc(audit_log::Column::CreatedAt);
        if let Some(entity_type) = filter.entity_type {
            query = query.filter(audit_log::Column::EntityType.eq(entity_type));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(audit_log::Column::UserId.eq(user_id));
        }
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }
}
