//! Role allow-lists for each API surface.
//!
//! Handlers check the caller against one of these with
//! [`AuthUser::require_any`](super::AuthUser::require_any).

use crate::entities::Role;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

pub const CATALOG_WRITE: &[Role] = &[Role::Admin, Role::Pharmacist];

pub const INVENTORY: &[Role] = &[Role::Admin, Role::Pharmacist, Role::Staff];

/// View every order and drive status changes
pub const ORDER_MANAGEMENT: &[Role] = &[Role::Admin, Role::Pharmacist, Role::Staff];

pub const PURCHASE_ORDERS: &[Role] = &[Role::Admin, Role::Pharmacist];

pub const CLAIMS: &[Role] = &[Role::Admin, Role::Pharmacist, Role::Staff];

pub const CLAIM_REVIEW: &[Role] = &[Role::Admin, Role::Pharmacist];

pub const PRESCRIPTION_REVIEW: &[Role] = &[Role::Admin, Role::Pharmacist];

pub const CUSTOMER_RECORDS: &[Role] = &[Role::Admin, Role::Pharmacist, Role::Staff];

pub fn is_staff(role: Role) -> bool {
    !matches!(role, Role::Customer)
}
