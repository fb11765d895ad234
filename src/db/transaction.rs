//! Commit-or-rollback for explicitly begun transactions.
//!
//! Services open a transaction with `db.begin()`, run their writes against it
//! and hand the outcome to [`finish`]. An `Ok` commits; an `Err` rolls back every
//! write made through the transaction and is returned unchanged.

use metrics::counter;
use sea_orm::DatabaseTransaction;
use tracing::{debug, warn};

use crate::errors::ServiceError;

pub async fn finish<T>(
    txn: DatabaseTransaction,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            counter!("pharmacy_db.transaction.committed", 1);
            debug!("Transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Transaction rollback failed");
            }
            counter!("pharmacy_db.transaction.rolled_back", 1);
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}
