use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::{GatewayError, ModelPricing, PriceKind, PriceUnit, Result};

/// One priced component of a call.
#[derive(Debug, Clone)]
pub struct CostLine {
    pub kind: PriceKind,
    pub unit: PriceUnit,
    pub units: Decimal,
    pub unit_price: Decimal,
    pub multiplier: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
    pub currency: String,
    pub lines: Vec<CostLine>,
}

/// Computes the cost of a call from the pricing rows active at a point in
/// time. Pure: storage access stays with the caller, so the same rows always
/// price to the same result.
pub struct PricingCalculator;

impl PricingCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Price `(input_units, output_units)` against the rows active at `at`.
    ///
    /// Missing input or output pricing is a configuration error surfaced as
    /// `PricingMissing`, never silently priced to zero.
    pub fn calculate(
        &self,
        model_id: i64,
        rows: &[ModelPricing],
        input_units: i64,
        output_units: i64,
        at: DateTime<Utc>,
    ) -> Result<CostBreakdown> {
        let input_row = self.active_row(rows, PriceKind::Input, at).ok_or(
            GatewayError::PricingMissing {
                model_id,
                kind: "input".to_string(),
            },
        )?;
        let output_row = self.active_row(rows, PriceKind::Output, at).ok_or(
            GatewayError::PricingMissing {
                model_id,
                kind: "output".to_string(),
            },
        )?;

        // Optional flat per-request component.
        let request_row = self.active_row(rows, PriceKind::Request, at);

        let currency = input_row.currency.clone();
        for row in [Some(output_row), request_row].into_iter().flatten() {
            if row.currency != currency {
                return Err(GatewayError::PricingInconsistent(format!(
                    "mixed currencies for model {}: {} vs {}",
                    model_id, currency, row.currency
                )));
            }
        }

        let mut lines = vec![
            price_line(input_row, Decimal::from(input_units)),
            price_line(output_row, Decimal::from(output_units)),
        ];
        if let Some(request_row) = request_row {
            lines.push(price_line(request_row, Decimal::ONE));
        }

        let input_cost = lines[0].amount;
        let output_cost = lines[1].amount;
        let total_cost = lines.iter().map(|l| l.amount).sum();

        Ok(CostBreakdown {
            input_cost,
            output_cost,
            total_cost,
            currency,
            lines,
        })
    }

    /// The row with the largest `effective_from <= at` whose end is open or
    /// after `at`.
    fn active_row<'a>(
        &self,
        rows: &'a [ModelPricing],
        kind: PriceKind,
        at: DateTime<Utc>,
    ) -> Option<&'a ModelPricing> {
        let mut best: Option<&ModelPricing> = None;
        for row in rows.iter().filter(|r| r.kind == kind && r.is_active_at(at)) {
            match best {
                Some(current) if current.effective_from >= row.effective_from => {}
                _ => best = Some(row),
            }
        }
        if best.is_none() {
            warn!("no active {} pricing at {}", kind.as_str(), at);
        }
        best
    }
}

impl Default for PricingCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn price_line(row: &ModelPricing, units: Decimal) -> CostLine {
    let amount = (units * row.applied_unit_price()).round_dp(10);
    CostLine {
        kind: row.kind,
        unit: row.unit,
        units,
        unit_price: row.price_per_unit,
        multiplier: row.multiplier,
        amount,
    }
}
