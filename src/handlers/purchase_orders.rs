use axum::{
    extract::State,
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    entities::purchase_order::PurchaseOrderStatus,
    errors::ServiceError,
    handlers::AppState,
    services::procurement::CreatePurchaseOrder,
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct PurchaseOrderListQuery {
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePurchaseOrderStatusRequest {
    pub status: PurchaseOrderStatus,
}

/// Create a new purchase order in DRAFT
pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreatePurchaseOrder>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::PURCHASE_ORDERS)?;
    let details = state.services.procurement.create(user.id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "purchase_order.created",
        "purchase_order",
        details.purchase_order.id,
        json!({
            "supplier_name": details.purchase_order.supplier_name,
            "total": details.purchase_order.total,
            "item_count": details.items.len(),
        }),
    )
    .await;

    info!("Purchase order created: {}", details.purchase_order.id);
    Ok(created_response(details))
}

pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<PurchaseOrderListQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::PURCHASE_ORDERS)?;
    let page = page.normalized();
    let (orders, total) = state
        .services
        .procurement
        .list(query.status, page.page, page.limit)
        .await?;
    Ok(paginated_response(orders, total, page))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::PURCHASE_ORDERS)?;
    Ok(success_response(state.services.procurement.get(id).await?))
}

/// Move a purchase order along its lifecycle; RECEIVED books the stock
pub async fn update_purchase_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdatePurchaseOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::PURCHASE_ORDERS)?;
    let previous = state.services.procurement.get(id).await?.purchase_order.status;
    let details = state
        .services
        .procurement
        .update_status(id, payload.status)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "purchase_order.status_changed",
        "purchase_order",
        id,
        json!({ "from": previous, "to": details.purchase_order.status }),
    )
    .await;

    Ok(success_response(details))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/purchase-orders",
            get(list_purchase_orders).post(create_purchase_order),
        )
        .route("/purchase-orders/:id", get(get_purchase_order))
        .route(
            "/purchase-orders/:id/status",
            put(update_purchase_order_status),
        )
}
