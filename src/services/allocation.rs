//! First-expiring-first-out planning over a medicine's inventory lots.
//!
//! Planning is pure: it takes a snapshot of lots and a requested quantity and
//! returns the per-lot deductions without touching the database. The order
//! service applies the plan with guarded decrements inside its transaction.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::inventory;

/// The fields of a lot that matter for allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotSnapshot {
    pub lot_id: Uuid,
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<&inventory::Model> for LotSnapshot {
    fn from(lot: &inventory::Model) -> Self {
        Self {
            lot_id: lot.id,
            quantity: lot.quantity,
            expiry_date: lot.expiry_date,
            created_at: lot.created_at,
        }
    }
}

/// Quantity to take from one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotDeduction {
    pub lot_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("requested {requested}, available {available}")]
pub struct Shortfall {
    pub requested: i64,
    pub available: i64,
}

/// Total units across lots, ignoring empty or negative rows
pub fn available_quantity(lots: &[LotSnapshot]) -> i64 {
    lots.iter()
        .filter(|lot| lot.quantity > 0)
        .map(|lot| i64::from(lot.quantity))
        .sum()
}

/// Drops lots whose expiry date is strictly before `today`
pub fn without_expired(lots: Vec<LotSnapshot>, today: NaiveDate) -> Vec<LotSnapshot> {
    lots.into_iter()
        .filter(|lot| lot.expiry_date.map_or(true, |expiry| expiry >= today))
        .collect()
}

/// Orders lots for draining: earliest expiry first, undated lots last, then
/// oldest lot, then lot id so the order is total.
pub fn fifo_order(lots: &mut [LotSnapshot]) {
    lots.sort_by_key(|lot| fifo_key(lot.expiry_date, lot.created_at, lot.lot_id));
}

/// Sort key for allocation order: dated lots by expiry, then undated lots,
/// ties broken by creation time and id
pub fn fifo_key(
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    lot_id: Uuid,
) -> (bool, Option<NaiveDate>, DateTime<Utc>, Uuid) {
    (expiry_date.is_none(), expiry_date, created_at, lot_id)
}

/// Plans how to take `requested` units from `lots` in FIFO-by-expiry order.
///
/// Every lot but the last one touched is drained completely. Fails without a
/// plan when the lots together hold fewer than `requested` units.
pub fn plan_fifo_deduction(
    lots: &[LotSnapshot],
    requested: i32,
) -> Result<Vec<LotDeduction>, Shortfall> {
    let available = available_quantity(lots);
    if i64::from(requested) > available {
        return Err(Shortfall {
            requested: i64::from(requested),
            available,
        });
    }

    let mut ordered: Vec<LotSnapshot> = lots.iter().filter(|l| l.quantity > 0).cloned().collect();
    fifo_order(&mut ordered);

    let mut remaining = requested;
    let mut plan = Vec::new();
    for lot in ordered {
        if remaining <= 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        plan.push(LotDeduction {
            lot_id: lot.lot_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(quantity: i32, expiry: Option<NaiveDate>, age_secs: i64) -> LotSnapshot {
        LotSnapshot {
            lot_id: Uuid::new_v4(),
            quantity,
            expiry_date: expiry,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(age_secs),
        }
    }

    #[test]
    fn spills_from_earliest_expiry_into_next_lot() {
        let a = lot(3, Some(day(2025, 1, 1)), 0);
        let b = lot(10, Some(day(2025, 6, 1)), 0);
        let plan = plan_fifo_deduction(&[b.clone(), a.clone()], 5).unwrap();
        assert_eq!(
            plan,
            vec![
                LotDeduction { lot_id: a.lot_id, quantity: 3 },
                LotDeduction { lot_id: b.lot_id, quantity: 2 },
            ]
        );
    }

    #[test]
    fn single_lot_covers_the_request() {
        let a = lot(3, Some(day(2025, 1, 1)), 0);
        let b = lot(10, Some(day(2025, 6, 1)), 0);
        let plan = plan_fifo_deduction(&[a.clone(), b], 2).unwrap();
        assert_eq!(plan, vec![LotDeduction { lot_id: a.lot_id, quantity: 2 }]);
    }

    #[test]
    fn undated_lots_drain_last() {
        let undated = lot(5, None, 0);
        let dated = lot(5, Some(day(2030, 1, 1)), 10);
        let plan = plan_fifo_deduction(&[undated.clone(), dated.clone()], 6).unwrap();
        assert_eq!(plan[0].lot_id, dated.lot_id);
        assert_eq!(plan[1], LotDeduction { lot_id: undated.lot_id, quantity: 1 });
    }

    #[test]
    fn equal_expiry_breaks_on_creation_time() {
        let newer = lot(4, Some(day(2026, 3, 1)), 100);
        let older = lot(4, Some(day(2026, 3, 1)), 0);
        let plan = plan_fifo_deduction(&[newer, older.clone()], 1).unwrap();
        assert_eq!(plan, vec![LotDeduction { lot_id: older.lot_id, quantity: 1 }]);
    }

    #[test]
    fn empty_lots_are_skipped() {
        let empty = lot(0, Some(day(2024, 1, 1)), 0);
        let full = lot(2, Some(day(2025, 1, 1)), 0);
        let plan = plan_fifo_deduction(&[empty, full.clone()], 2).unwrap();
        assert_eq!(plan, vec![LotDeduction { lot_id: full.lot_id, quantity: 2 }]);
    }

    #[test]
    fn shortfall_reports_available_total() {
        let lots = [lot(3, None, 0), lot(1, None, 1)];
        assert_eq!(
            plan_fifo_deduction(&lots, 5),
            Err(Shortfall { requested: 5, available: 4 })
        );
    }

    #[test]
    fn no_lots_means_shortfall() {
        assert_eq!(
            plan_fifo_deduction(&[], 1),
            Err(Shortfall { requested: 1, available: 0 })
        );
    }

    #[test]
    fn expired_lots_can_be_filtered() {
        let today = day(2025, 3, 1);
        let expired = lot(5, Some(day(2025, 2, 28)), 0);
        let expires_today = lot(5, Some(today), 0);
        let undated = lot(5, None, 0);
        let kept = without_expired(vec![expired, expires_today.clone(), undated.clone()], today);
        assert_eq!(kept, vec![expires_today, undated]);
    }

    fn arb_lot() -> impl Strategy<Value = LotSnapshot> {
        (
            0i32..50,
            proptest::option::of(0u32..400),
            0i64..1000,
        )
            .prop_map(|(quantity, expiry_offset, age)| {
                lot(
                    quantity,
                    expiry_offset.map(|d| day(2025, 1, 1) + Duration::days(i64::from(d))),
                    age,
                )
            })
    }

    proptest! {
        #[test]
        fn plan_matches_request_and_respects_lots(
            lots in proptest::collection::vec(arb_lot(), 0..8),
            requested in 1i32..200,
        ) {
            let available = available_quantity(&lots);
            match plan_fifo_deduction(&lots, requested) {
                Ok(plan) => {
                    let total: i64 = plan.iter().map(|d| i64::from(d.quantity)).sum();
                    prop_assert_eq!(total, i64::from(requested));

                    for step in &plan {
                        let source = lots.iter().find(|l| l.lot_id == step.lot_id).unwrap();
                        prop_assert!(step.quantity > 0);
                        prop_assert!(step.quantity <= source.quantity);
                    }

                    let partial = plan
                        .iter()
                        .filter(|d| {
                            lots.iter().find(|l| l.lot_id == d.lot_id).unwrap().quantity != d.quantity
                        })
                        .count();
                    prop_assert!(partial <= 1);
                }
                Err(shortfall) => {
                    prop_assert!(i64::from(requested) > available);
                    prop_assert_eq!(shortfall.available, available);
                }
            }
        }

        #[test]
        fn plan_follows_expiry_order(
            lots in proptest::collection::vec(arb_lot(), 1..8),
            requested in 1i32..200,
        ) {
            if let Ok(plan) = plan_fifo_deduction(&lots, requested) {
                let mut ordered: Vec<LotSnapshot> =
                    lots.iter().filter(|l| l.quantity > 0).cloned().collect();
                fifo_order(&mut ordered);
                let expected: Vec<Uuid> = ordered.iter().take(plan.len()).map(|l| l.lot_id).collect();
                let actual: Vec<Uuid> = plan.iter().map(|d| d.lot_id).collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
