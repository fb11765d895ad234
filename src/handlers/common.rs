use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::audit::{AuditEntry, AuditService},
    ApiResponse, ListQuery, PaginatedResponse,
};

/// JSON body whose rejections render as the failure envelope
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string whose rejections render as the failure envelope
pub struct QueryParams<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `:id` path segment parsed as a UUID
pub struct EntityId(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for EntityId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| ServiceError::BadRequest("Invalid id in path".to_string()))?;
        Ok(Self(id))
    }
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Page of results inside the success envelope
pub fn paginated_response<T: Serialize>(items: Vec<T>, total: u64, query: ListQuery) -> Response {
    success_response(PaginatedResponse::new(items, total, query))
}

/// Records one audit row for a committed mutation
pub async fn audit(
    audit: &AuditService,
    actor: Option<Uuid>,
    action: &'static str,
    entity_type: &'static str,
    entity_id: impl ToString,
    details: serde_json::Value,
) {
    audit
        .record(
            AuditEntry::new(actor, action, entity_type)
                .entity(entity_id)
                .details(details),
        )
        .await;
}
