use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{order, prescription, prescription::PrescriptionStatus},
    errors::ServiceError,
};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf"];

/// Lower-cased extension of `filename` when it is an accepted upload type
pub fn accepted_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// A file received from the client, not yet stored
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPrescription {
    pub status: PrescriptionStatus,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct PrescriptionService {
    db: Arc<DatabaseConnection>,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl PrescriptionService {
    pub fn new(db: Arc<DatabaseConnection>, upload_dir: impl Into<PathBuf>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            upload_dir: upload_dir.into(),
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Stores the file under the upload directory with a generated name and
    /// records a PENDING prescription for `user_id`.
    #[instrument(skip(self, upload), fields(user_id = %user_id, filename = %upload.filename, size = upload.bytes.len()))]
    pub async fn upload(
        &self,
        user_id: Uuid,
        order_id: Option<Uuid>,
        upload: Upload,
    ) -> Result<prescription::Model, ServiceError> {
        let ext = accepted_extension(&upload.filename).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Unsupported file type; allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;
        if upload.bytes.is_empty() {
            return Err(ServiceError::ValidationError("Uploaded file is empty".into()));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(ServiceError::ValidationError(format!(
                "File exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let db = &*self.db;
        if let Some(order_id) = order_id {
            order::Entity::find_by_id(order_id)
                .one(db)
                .await?
                .filter(|o| o.user_id == user_id)
                .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        }

        let id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(format!("{}.{}", id, ext));
        tokio::fs::write(&path, &upload.bytes).await?;

        let now = Utc::now();
        let record = prescription::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            file_path: Set(path.to_string_lossy().into_owned()),
            original_filename: Set(upload.filename),
            status: Set(PrescriptionStatus::Pending),
            verified_by: Set(None),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await;

        match record {
            Ok(saved) => {
                info!(prescription_id = %saved.id, "Prescription uploaded");
                Ok(saved)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(error = %rm, path = %path.display(), "Failed to remove orphaned upload");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<prescription::Model, ServiceError> {
        prescription::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Prescription", id))
    }

    /// Newest first; restricted to `user_id` when given
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        status: Option<PrescriptionStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<prescription::Model>, u64), ServiceError> {
        let mut query =
            prescription::Entity::find().order_by_desc(prescription::Column::CreatedAt);
        if let Some(user_id) = user_id {
            query = query.filter(prescription::Column::UserId.eq(user_id));
        }
        if let Some(status) = status {
            query = query.filter(prescription::Column::Status.eq(status));
        }
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// PENDING → VERIFIED or REJECTED
    #[instrument(skip(self, input), fields(prescription_id = %id, status = %input.status))]
    pub async fn verify(
        &self,
        id: Uuid,
        verifier: Uuid,
        input: VerifyPrescription,
    ) -> Result<prescription::Model, ServiceError> {
        input.validate()?;
        if input.status == PrescriptionStatus::Pending {
            return Err(ServiceError::InvalidStatus(
                "Prescription can only be verified or rejected".into(),
            ));
        }
        let found = self.get(id).await?;
        if found.status != PrescriptionStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Prescription is already {}",
                found.status
            )));
        }

        let mut active: prescription::ActiveModel = found.into();
        active.status = Set(input.status);
        active.verified_by = Set(Some(verifier));
        active.notes = Set(input.notes);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}
