use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingKind {
    Usage,
    Adjustment,
    Refund,
}

impl BillingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingKind::Usage => "usage",
            BillingKind::Adjustment => "adjustment",
            BillingKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "adjustment" => BillingKind::Adjustment,
            "refund" => BillingKind::Refund,
            _ => BillingKind::Usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Processed,
    Failed,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Processed => "processed",
            BillingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processed" => BillingStatus::Processed,
            "failed" => BillingStatus::Failed,
            _ => BillingStatus::Pending,
        }
    }
}

/// One debit against a user balance, keyed one-to-one to a usage log.
/// Transitions: pending -> processed | failed; failed -> pending (retry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub id: i64,
    pub user_id: i64,
    pub usage_log_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub kind: BillingKind,
    pub status: BillingStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl BillingRecord {
    pub fn usage(user_id: i64, usage_log_id: i64, amount: Decimal, currency: String) -> Self {
        Self {
            id: 0,
            user_id,
            usage_log_id,
            amount,
            currency,
            kind: BillingKind::Usage,
            status: BillingStatus::Pending,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}
