use axum::{extract::State, response::Response, routing::post, Router};
use serde_json::json;
use tracing::info;

use super::common::{audit, created_response, success_response, JsonBody};
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::users::{LoginRequest, RegisterUser},
};

/// Self-service registration; always creates a CUSTOMER account
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterUser>,
) -> Result<Response, ServiceError> {
    let user = state.services.users.register(payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "user.registered",
        "user",
        user.id,
        json!({ "email": user.email, "role": user.role }),
    )
    .await;

    info!(user_id = %user.id, "User registered");
    Ok(created_response(user))
}

/// Exchanges email and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response, ServiceError> {
    let response = state.services.users.login(payload).await?;
    info!(user_id = %response.user.id, "User logged in");
    Ok(success_response(response))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}
