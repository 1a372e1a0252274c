// Accounting: durable usage + billing side effects and the settle
// primitive shared with the billing sweeper.

pub mod recorder;

use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::domain::{BillingRecord, BillingStatus, Result};
use crate::storage::repository::{adjust_user_balance, mark_billing_status};

pub use recorder::{AccountingRecorder, CompletedCall, Recorded};

/// Debit the user and mark the record processed, atomically. The only path
/// that moves a billing record to `processed`.
pub async fn settle_billing(pool: &Pool<Sqlite>, record: &BillingRecord) -> Result<()> {
    if record.status == BillingStatus::Processed {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    adjust_user_balance(&mut tx, record.user_id, -record.amount).await?;
    mark_billing_status(&mut tx, record.id, BillingStatus::Processed, Some(Utc::now())).await?;
    tx.commit().await?;
    Ok(())
}
