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
    entities::Role,
    errors::ServiceError,
    handlers::AppState,
    services::users::{RegisterUser, UpdateProfile, UserFilter},
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub account: RegisterUser,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let profile = state.services.users.get(user.id).await?;
    Ok(success_response(profile))
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<UpdateProfile>,
) -> Result<Response, ServiceError> {
    let password_changed = payload.password.is_some();
    let profile = state.services.users.update_profile(user.id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "user.profile_updated",
        "user",
        user.id,
        json!({ "password_changed": password_changed }),
    )
    .await;

    Ok(success_response(profile))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(filter): QueryParams<UserListQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    let page = page.normalized();
    let (users, total) = state
        .services
        .users
        .list(
            UserFilter {
                role: filter.role,
                search: filter.search,
            },
            page.page,
            page.limit,
        )
        .await?;
    Ok(paginated_response(users, total, page))
}

/// Admin-created account with an explicit role
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    let created = state
        .services
        .users
        .create_user(payload.account, payload.role)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "user.created",
        "user",
        created.id,
        json!({ "email": created.email, "role": created.role }),
    )
    .await;

    Ok(created_response(created))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    Ok(success_response(state.services.users.get(id).await?))
}

pub async fn change_role(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<ChangeRoleRequest>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    let previous = state.services.users.get(id).await?.role;
    let updated = state
        .services
        .users
        .change_role(user.id, id, payload.role)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "user.role_changed",
        "user",
        id,
        json!({ "from": previous, "to": updated.role }),
    )
    .await;

    info!(target_user = %id, role = %updated.role, "User role changed");
    Ok(success_response(updated))
}

pub async fn set_active(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<SetActiveRequest>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    let updated = state
        .services
        .users
        .set_active(user.id, id, payload.is_active)
        .await?;

    audit(
        &state.services.audit,
        Some(user.id),
        if updated.is_active {
            "user.activated"
        } else {
            "user.deactivated"
        },
        "user",
        id,
        json!({ "is_active": updated.is_active }),
    )
    .await;

    Ok(success_response(updated))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/role", put(change_role))
        .route("/users/:id/active", put(set_active))
}
