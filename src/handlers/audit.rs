use axum::{extract::State, response::Response, routing::get, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::common::{paginated_response, QueryParams};
use crate::{
    auth::{roles, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::audit::AuditFilter,
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub entity_type: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Newest entries first
pub async fn list_audit_logs(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<AuditLogQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::ADMIN_ONLY)?;
    let page = page.normalized();
    let (entries, total) = state
        .services
        .audit
        .list(
            AuditFilter {
                entity_type: query.entity_type,
                user_id: query.user_id,
            },
            page.page,
            page.limit,
        )
        .await?;
    Ok(paginated_response(entries, total, page))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/audit-logs", get(list_audit_logs))
}
