use axum::{
    extract::State,
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    entities::OrderStatus,
    errors::ServiceError,
    handlers::AppState,
    services::{
        order_status::StatusChange,
        orders::{OrderFilter, OrderLine, PlaceOrder},
    },
    ListQuery,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderLine>,
    #[validate(length(max = 500))]
    pub shipping_address: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
}

/// Place an order for the caller
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    payload.validate()?;

    let details = state
        .services
        .orders
        .place_order(
            user.id,
            PlaceOrder {
                items: payload.items,
                shipping_address: payload.shipping_address,
                notes: payload.notes,
                payment_method: payload.payment_method,
            },
        )
        .await?;

    let lines: Vec<_> = details
        .items
        .iter()
        .map(|item| json!({ "medicine_id": item.medicine_id, "quantity": item.quantity }))
        .collect();
    audit(
        &state.services.audit,
        Some(user.id),
        "order.placed",
        "order",
        details.order.id,
        json!({ "total": details.order.total, "items": lines }),
    )
    .await;

    info!(order_id = %details.order.id, "Order created");
    Ok(created_response(details))
}

/// Staff see every order; anyone else sees their own
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let page = page.normalized();
    let user_id = if user.has_any(roles::ORDER_MANAGEMENT) {
        query.user_id
    } else {
        Some(user.id)
    };

    let (orders, total) = state
        .services
        .orders
        .list_orders(
            OrderFilter {
                user_id,
                status: query.status,
            },
            page.page,
            page.limit,
        )
        .await?;
    Ok(paginated_response(orders, total, page))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    let details = state.services.orders.get_order(id).await?;
    if details.order.user_id != user.id && !user.has_any(roles::ORDER_MANAGEMENT) {
        return Err(ServiceError::not_found("Order", id));
    }
    Ok(success_response(details))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ORDER_MANAGEMENT)?;
    let change = state
        .services
        .order_status
        .update_status(id, payload.status)
        .await?;

    audit_status_change(&state, &user, &change).await;
    Ok(success_response(change))
}

/// Customers cancel their own PENDING orders; staff may cancel any order the
/// status rules allow
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    let change = if user.has_any(roles::ORDER_MANAGEMENT) {
        state
            .services
            .order_status
            .update_status(id, OrderStatus::Cancelled)
            .await?
    } else {
        state.services.order_status.cancel_own(id, user.id).await?
    };

    audit_status_change(&state, &user, &change).await;
    Ok(success_response(change))
}

async fn audit_status_change(state: &AppState, user: &AuthUser, change: &StatusChange) {
    audit(
        &state.services.audit,
        Some(user.id),
        "order.status_changed",
        "order",
        change.order.id,
        json!({
            "from": change.previous,
            "to": change.order.status,
            "units_restocked": change.units_restocked,
        }),
    )
    .await;
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_order_status))
        .route("/orders/:id/cancel", post(cancel_order))
}
