use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "suspended" => UserStatus::Suspended,
            "deleted" => UserStatus::Deleted,
            _ => UserStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: UserStatus,

    /// Account balance. May go negative inside an accounting transaction
    /// (soft overdraft); admission requires it to be non-negative.
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String, balance: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            status: UserStatus::Active,
            balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Admission gate: active account with a non-negative balance.
    pub fn can_make_request(&self) -> bool {
        self.status == UserStatus::Active && self.balance >= Decimal::ZERO
    }
}
