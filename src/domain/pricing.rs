use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceKind {
    Input,
    Output,
    Request,
}

impl PriceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceKind::Input => "input",
            PriceKind::Output => "output",
            PriceKind::Request => "request",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "output" => PriceKind::Output,
            "request" => PriceKind::Request,
            _ => PriceKind::Input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceUnit {
    Token,
    Request,
    Character,
}

impl PriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceUnit::Token => "token",
            PriceUnit::Request => "request",
            PriceUnit::Character => "character",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "request" => PriceUnit::Request,
            "character" => PriceUnit::Character,
            _ => PriceUnit::Token,
        }
    }
}

/// An effective-dated price row. The applied unit price is
/// `price_per_unit * multiplier`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub id: i64,
    pub model_id: i64,
    pub kind: PriceKind,
    pub price_per_unit: Decimal,
    pub multiplier: Decimal,
    pub unit: PriceUnit,
    pub currency: String,

    pub effective_from: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_until: Option<DateTime<Utc>>,
}

impl ModelPricing {
    pub fn new(model_id: i64, kind: PriceKind, price_per_unit: Decimal) -> Self {
        Self {
            id: 0,
            model_id,
            kind,
            price_per_unit,
            multiplier: Decimal::new(15, 1), // 1.5
            unit: PriceUnit::Token,
            currency: "USD".to_string(),
            effective_from: Utc::now(),
            effective_until: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_effective_from(mut self, from: DateTime<Utc>) -> Self {
        self.effective_from = from;
        self
    }

    pub fn with_effective_until(mut self, until: DateTime<Utc>) -> Self {
        self.effective_until = Some(until);
        self
    }

    /// Active at T iff `effective_from <= T < effective_until` (open end = infinity).
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        if at < self.effective_from {
            return false;
        }
        match self.effective_until {
            Some(until) => at < until,
            None => true,
        }
    }

    pub fn applied_unit_price(&self) -> Decimal {
        self.price_per_unit * self.multiplier
    }
}
