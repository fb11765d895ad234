use axum::{
    extract::State,
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::catalog::{
        CreateCategory, CreateMedicine, MedicineQuery, UpdateCategory, UpdateMedicine,
    },
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct MedicineFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
}

// Categories

pub async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(success_response(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateCategory>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    let category = state.services.catalog.create_category(payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "category.created",
        "category",
        category.id,
        json!({ "name": category.name }),
    )
    .await;

    Ok(created_response(category))
}

pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdateCategory>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    let category = state.services.catalog.update_category(id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "category.updated",
        "category",
        id,
        json!({ "name": category.name }),
    )
    .await;

    Ok(success_response(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    state.services.catalog.delete_category(id).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "category.deleted",
        "category",
        id,
        json!({}),
    )
    .await;

    Ok(success_response(json!({ "id": id, "deleted": true })))
}

// Medicines

pub async fn list_medicines(
    State(state): State<AppState>,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<MedicineFilter>,
) -> Result<Response, ServiceError> {
    let page = page.normalized();
    let (medicines, total) = state
        .services
        .catalog
        .list_medicines(MedicineQuery {
            search: filter.search,
            category_id: filter.category_id,
            page: page.page,
            limit: page.limit,
        })
        .await?;
    Ok(paginated_response(medicines, total, page))
}

pub async fn get_medicine(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.services.catalog.get_medicine(id).await?))
}

pub async fn create_medicine(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateMedicine>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    let medicine = state.services.catalog.create_medicine(payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "medicine.created",
        "medicine",
        medicine.id,
        json!({ "name": medicine.name, "price": medicine.price }),
    )
    .await;

    info!(medicine_id = %medicine.id, "Medicine created");
    Ok(created_response(medicine))
}

pub async fn update_medicine(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdateMedicine>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    let medicine = state.services.catalog.update_medicine(id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "medicine.updated",
        "medicine",
        id,
        json!({ "name": medicine.name, "price": medicine.price }),
    )
    .await;

    Ok(success_response(medicine))
}

pub async fn delete_medicine(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CATALOG_WRITE)?;
    state.services.catalog.delete_medicine(id).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "medicine.deleted",
        "medicine",
        id,
        json!({}),
    )
    .await;

    Ok(success_response(json!({ "id": id, "deleted": true })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            put(update_category).delete(delete_category),
        )
        .route("/medicines", get(list_medicines).post(create_medicine))
        .route(
            "/medicines/:id",
            get(get_medicine)
                .put(update_medicine)
                .delete(delete_medicine),
        )
}
