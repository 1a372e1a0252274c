use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Requests,
    Tokens,
    Cost,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Requests => "requests",
            QuotaKind::Tokens => "tokens",
            QuotaKind::Cost => "cost",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "tokens" => QuotaKind::Tokens,
            "cost" => QuotaKind::Cost,
            _ => QuotaKind::Requests,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Minute,
    Hour,
    Day,
    Month,
}

impl QuotaPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaPeriod::Minute => "minute",
            QuotaPeriod::Hour => "hour",
            QuotaPeriod::Day => "day",
            QuotaPeriod::Month => "month",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(QuotaPeriod::Minute),
            "hour" => Some(QuotaPeriod::Hour),
            "day" => Some(QuotaPeriod::Day),
            "month" => Some(QuotaPeriod::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaStatus {
    Active,
    Inactive,
}

impl QuotaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaStatus::Active => "active",
            QuotaStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => QuotaStatus::Inactive,
            _ => QuotaStatus::Active,
        }
    }
}

/// A budget attached to a credential. `period = None` means a total
/// (non-resetting) quota with a singleton bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quota {
    pub id: i64,
    pub credential_id: i64,
    pub kind: QuotaKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<QuotaPeriod>,

    pub limit: Decimal,

    /// "HH:MM" anchor for day and month periods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,

    pub status: QuotaStatus,
}

impl Quota {
    pub fn new(
        credential_id: i64,
        kind: QuotaKind,
        period: Option<QuotaPeriod>,
        limit: Decimal,
    ) -> Self {
        Self {
            id: 0,
            credential_id,
            kind,
            period,
            limit,
            reset_time: None,
            status: QuotaStatus::Active,
        }
    }

    pub fn with_reset_time(mut self, reset_time: String) -> Self {
        self.reset_time = Some(reset_time);
        self
    }
}

/// Accumulated usage for one bucket: `(quota, period_start)` for period
/// quotas, a singleton per quota for total quotas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub id: i64,
    pub credential_id: i64,
    pub quota_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,

    pub used_value: Decimal,
}
