use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::{insurance_claim, insurance_claim::ClaimStatus, order},
    errors::ServiceError,
};

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(ValidationError::new("claim_amount_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateClaim {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub provider: String,
    #[validate(length(min = 1, max = 100))]
    pub policy_number: String,
    #[validate(custom = "positive_amount")]
    pub claim_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewClaim {
    pub status: ClaimStatus,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct InsuranceService {
    db: Arc<DatabaseConnection>,
}

impl InsuranceService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Files a claim against an order; the amount may not exceed the order total
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create(
        &self,
        created_by: Uuid,
        input: CreateClaim,
    ) -> Result<insurance_claim::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;
        let order = order::Entity::find_by_id(input.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", input.order_id))?;

        if input.claim_amount > order.total {
            return Err(ServiceError::ValidationError(format!(
                "Claim amount {} exceeds order total {}",
                input.claim_amount, order.total
            )));
        }

        let now = Utc::now();
        let claim = insurance_claim::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            provider: Set(input.provider),
            policy_number: Set(input.policy_number),
            claim_amount: Set(input.claim_amount),
            status: Set(ClaimStatus::Submitted),
            reviewer_notes: Set(None),
            reviewed_by: Set(None),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(claim_id = %claim.id, "Insurance claim submitted");
        Ok(claim)
    }

    pub async fn get(&self, id: Uuid) -> Result<insurance_claim::Model, ServiceError> {
        insurance_claim::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Insurance claim", id))
    }

    pub async fn list(
        &self,
        status: Option<ClaimStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<insurance_claim::Model>, u64), ServiceError> {
        let mut query =
            insurance_claim::Entity::find().order_by_desc(insurance_claim::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(insurance_claim::Column::Status.eq(status));
        }
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// SUBMITTED claims are approved or rejected; APPROVED claims are paid
    #[instrument(skip(self, input), fields(claim_id = %id, status = %input.status))]
    pub async fn review(
        &self,
        id: Uuid,
        reviewer: Uuid,
        input: ReviewClaim,
    ) -> Result<insurance_claim::Model, ServiceError> {
        input.validate()?;
        let claim = self.get(id).await?;
        if !claim.status.can_transition_to(input.status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition claim from {} to {}",
                claim.status, input.status
            )));
        }

        let mut active: insurance_claim::ActiveModel = claim.into();
        active.status = Set(input.status);
        if input.notes.is_some() {
            active.reviewer_notes = Set(input.notes);
        }
        active.reviewed_by = Set(Some(reviewer));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(ClaimStatus::Submitted, ClaimStatus::Approved, true)]
    #[case(ClaimStatus::Submitted, ClaimStatus::Rejected, true)]
    #[case(ClaimStatus::Approved, ClaimStatus::Paid, true)]
    #[case(ClaimStatus::Submitted, ClaimStatus::Paid, false)]
    #[case(ClaimStatus::Rejected, ClaimStatus::Approved, false)]
    #[case(ClaimStatus::Paid, ClaimStatus::Rejected, false)]
    fn claim_transitions(#[case] from: ClaimStatus, #[case] to: ClaimStatus, #[case] ok: bool) {
        assert_eq!(from.can_transition_to(to), ok);
    }

    #[test]
    fn zero_claim_amount_is_invalid() {
        let input = CreateClaim {
            order_id: Uuid::new_v4(),
            provider: "HealthFirst".into(),
            policy_number: "HF-1".into(),
            claim_amount: dec!(0),
        };
        assert!(input.validate().is_err());
    }
}
