use axum::{extract::State, response::Response, routing::get, Router};
use serde::Deserialize;
use serde_json::json;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::customers::{CreateCustomer, UpdateCustomer},
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct CustomerSearch {
    pub search: Option<String>,
}

pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<CustomerSearch>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CUSTOMER_RECORDS)?;
    let page = page.normalized();
    let (customers, total) = state
        .services
        .customers
        .list(query.search, page.page, page.limit)
        .await?;
    Ok(paginated_response(customers, total, page))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CUSTOMER_RECORDS)?;
    Ok(success_response(state.services.customers.get(id).await?))
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateCustomer>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CUSTOMER_RECORDS)?;
    let customer = state.services.customers.create(payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "customer.created",
        "customer",
        customer.id,
        json!({ "name": customer.name }),
    )
    .await;

    Ok(created_response(customer))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<UpdateCustomer>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CUSTOMER_RECORDS)?;
    let customer = state.services.customers.update(id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "customer.updated",
        "customer",
        id,
        json!({ "name": customer.name }),
    )
    .await;

    Ok(success_response(customer))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CUSTOMER_RECORDS)?;
    state.services.customers.delete(id).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "customer.deleted",
        "customer",
        id,
        json!({}),
    )
    .await;

    Ok(success_response(json!({ "id": id, "deleted": true })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/:id",
            get(get_customer)
                .put(update_customer)
                .delete(delete_customer),
        )
}
