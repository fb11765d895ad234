use axum::{extract::State, response::Response, routing::get, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::common::{audit, created_response, success_response, EntityId, JsonBody, QueryParams};
use crate::{
    auth::{roles, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::inventory::{CreateLot, UpdateLot},
};

#[derive(Debug, Deserialize)]
pub struct LotQuery {
    pub medicine_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

/// Lots in allocation order; filtered to one medicine when `medicine_id` is set
pub async fn list_lots(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(query): QueryParams<LotQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    let lots = state.services.inventory.list_lots(query.medicine_id).await?;
    Ok(success_response(lots))
}

pub async fn get_lot(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    Ok(success_response(state.services.inventory.get_lot(id).await?))
}

pub async fn create_lot(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateLot>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    let lot = state.services.inventory.create_lot(payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "inventory.created",
        "inventory",
        lot.id,
        json!({
            "medicine_id": lot.medicine_id,
            "batch_number": lot.batch_number,
            "quantity": lot.quantity,
            "expiry_date": lot.expiry_date,
        }),
    )
    .await;

    Ok(created_response(lot))
}

pub async fn update_lot(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdateLot>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    let before = state.services.inventory.get_lot(id).await?;
    let lot = state.services.inventory.update_lot(id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "inventory.updated",
        "inventory",
        id,
        json!({
            "quantity_before": before.quantity,
            "quantity_after": lot.quantity,
            "batch_number": lot.batch_number,
            "expiry_date": lot.expiry_date,
        }),
    )
    .await;

    Ok(success_response(lot))
}

pub async fn delete_lot(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    state.services.inventory.delete_lot(id).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "inventory.deleted",
        "inventory",
        id,
        json!({}),
    )
    .await;

    Ok(success_response(json!({ "id": id, "deleted": true })))
}

pub async fn stock_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    Ok(success_response(state.services.inventory.stock_summary().await?))
}

pub async fn low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(query): QueryParams<LowStockQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    let report = state.services.inventory.low_stock(query.threshold).await?;
    Ok(success_response(report))
}

pub async fn expiring_soon(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(query): QueryParams<ExpiringQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::INVENTORY)?;
    let report = state.services.inventory.expiring_soon(query.days).await?;
    Ok(success_response(report))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_lots).post(create_lot))
        .route("/inventory/summary", get(stock_summary))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/expiring", get(expiring_soon))
        .route(
            "/inventory/:id",
            get(get_lot).put(update_lot).delete(delete_lot),
        )
}
