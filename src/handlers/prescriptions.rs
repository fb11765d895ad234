use axum::{
    extract::{Multipart, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    entities::prescription::PrescriptionStatus,
    errors::ServiceError,
    handlers::AppState,
    services::prescriptions::{Upload, VerifyPrescription},
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct PrescriptionListQuery {
    pub status: Option<PrescriptionStatus>,
    pub user_id: Option<Uuid>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ServiceError {
    ServiceError::BadRequest(format!("Invalid multipart body: {}", err))
}

/// Multipart upload: a `file` part and an optional `order_id` part
pub async fn upload_prescription(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Response, ServiceError> {
    let mut upload: Option<Upload> = None;
    let mut order_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ServiceError::ValidationError("File part has no filename".into()))?;
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            Some("order_id") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    order_id = Some(Uuid::parse_str(raw).map_err(|_| {
                        ServiceError::ValidationError("order_id is not a valid id".into())
                    })?);
                }
            }
            _ => {}
        }
    }

    let upload = upload
        .ok_or_else(|| ServiceError::ValidationError("Missing file part".to_string()))?;
    let prescription = state
        .services
        .prescriptions
        .upload(user.id, order_id, upload)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "prescription.uploaded",
        "prescription",
        prescription.id,
        json!({
            "order_id": prescription.order_id,
            "original_filename": prescription.original_filename,
        }),
    )
    .await;

    Ok(created_response(prescription))
}

/// Reviewers list everything; other callers only their own uploads
pub async fn list_prescriptions(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<PrescriptionListQuery>,
) -> Result<Response, ServiceError> {
    let page = page.normalized();
    let user_filter = if user.has_any(roles::PRESCRIPTION_REVIEW) {
        query.user_id
    } else {
        Some(user.id)
    };
    let (rows, total) = state
        .services
        .prescriptions
        .list(user_filter, query.status, page.page, page.limit)
        .await?;
    Ok(paginated_response(rows, total, page))
}

pub async fn get_prescription(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    let prescription = state.services.prescriptions.get(id).await?;
    if prescription.user_id != user.id && !user.has_any(roles::PRESCRIPTION_REVIEW) {
        return Err(ServiceError::not_found("Prescription", id));
    }
    Ok(success_response(prescription))
}

pub async fn verify_prescription(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<VerifyPrescription>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::PRESCRIPTION_REVIEW)?;
    let prescription = state
        .services
        .prescriptions
        .verify(id, user.id, payload)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "prescription.verified",
        "prescription",
        id,
        json!({ "status": prescription.status, "notes": prescription.notes }),
    )
    .await;

    Ok(success_response(prescription))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/prescriptions",
            get(list_prescriptions).post(upload_prescription),
        )
        .route("/prescriptions/:id", get(get_prescription))
        .route("/prescriptions/:id/verify", put(verify_prescription))
}
