use axum::{
    extract::State,
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::common::{
    audit, created_response, paginated_response, success_response, EntityId, JsonBody,
    QueryParams,
};
use crate::{
    auth::{roles, AuthUser},
    entities::insurance_claim::ClaimStatus,
    errors::ServiceError,
    handlers::AppState,
    services::insurance::{CreateClaim, ReviewClaim},
    ListQuery,
};

#[derive(Debug, Deserialize)]
pub struct ClaimListQuery {
    pub status: Option<ClaimStatus>,
}

pub async fn create_claim(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CreateClaim>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CLAIMS)?;
    let claim = state.services.insurance.create(user.id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "insurance_claim.created",
        "insurance_claim",
        claim.id,
        json!({
            "order_id": claim.order_id,
            "provider": claim.provider,
            "claim_amount": claim.claim_amount,
        }),
    )
    .await;

    Ok(created_response(claim))
}

pub async fn list_claims(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<ListQuery>,
    QueryParams(query): QueryParams<ClaimListQuery>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CLAIMS)?;
    let page = page.normalized();
    let (claims, total) = state
        .services
        .insurance
        .list(query.status, page.page, page.limit)
        .await?;
    Ok(paginated_response(claims, total, page))
}

pub async fn get_claim(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CLAIMS)?;
    Ok(success_response(state.services.insurance.get(id).await?))
}

pub async fn review_claim(
    State(state): State<AppState>,
    user: AuthUser,
    EntityId(id): EntityId,
    JsonBody(payload): JsonBody<ReviewClaim>,
) -> Result<Response, ServiceError> {
    user.require_any(roles::CLAIM_REVIEW)?;
    let claim = state.services.insurance.review(id, user.id, payload).await?;

    audit(
        &state.services.audit,
        Some(user.id),
        "insurance_claim.reviewed",
        "insurance_claim",
        id,
        json!({ "status": claim.status, "notes": claim.reviewer_notes }),
    )
    .await;

    Ok(success_response(claim))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/insurance-claims", get(list_claims).post(create_claim))
        .route("/insurance-claims/:id", get(get_claim))
        .route("/insurance-claims/:id/review", put(review_claim))
}
