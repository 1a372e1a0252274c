use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use tracing::{error, info, warn};

use crate::domain::{BillingRecord, GatewayError, ModelPricing, Result, UsageLog};
use crate::engine::PricingCalculator;
use crate::governor::{ActualUnits, QuotaGovernor, Reservation};
use crate::storage::repository::{
    fetch_usage_log_by_request_id, insert_billing_record, insert_usage_log,
};
use crate::storage::BillingRepository;

/// Everything the proxy measured about one finished forward.
#[derive(Debug, Clone)]
pub struct CompletedCall {
    pub request_id: String,
    pub user_id: i64,
    pub credential_id: i64,
    pub provider_id: i64,
    pub model_id: i64,
    pub method: String,
    pub endpoint: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub duration_ms: i64,
    pub status_code: i32,
    pub error_message: Option<String>,
}

#[derive(Debug)]
pub enum Recorded {
    /// First write for this request id.
    Fresh(UsageLog),
    /// A log already existed: the caller must release its reservation.
    Replayed(UsageLog),
}

/// Persists the outcome of a forwarded call. The usage log write is the
/// durability point: once it exists it is never rolled back, and every later
/// failure is left for the billing sweeper.
pub struct AccountingRecorder {
    pool: Pool<Sqlite>,
    billing: crate::storage::SqliteBillingRepository,
    calculator: PricingCalculator,
}

impl AccountingRecorder {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let billing = crate::storage::SqliteBillingRepository::new(pool.clone());
        Self {
            pool,
            billing,
            calculator: PricingCalculator::new(),
        }
    }

    /// Record a successful (2xx) forward: usage log, pending billing record,
    /// and quota commit in one transaction; then the balance debit.
    pub async fn record_success(
        &self,
        call: CompletedCall,
        reservation: &Reservation,
        pricing_rows: &[ModelPricing],
    ) -> Result<Recorded> {
        let created_at = Utc::now();
        let breakdown = self.calculator.calculate(
            call.model_id,
            pricing_rows,
            call.input_tokens,
            call.output_tokens,
            created_at,
        )?;

        let mut log = build_log(&call, created_at);
        log.cost = breakdown.total_cost;
        log.validate()?;

        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_usage_log_by_request_id(&mut tx, &call.request_id).await? {
            return Ok(Recorded::Replayed(existing));
        }

        let log_id = match insert_usage_log(&mut tx, &log).await {
            Ok(id) => id,
            Err(GatewayError::Database(e)) if is_unique_violation(&e) => {
                // Lost the insert race; surface the winner's row.
                drop(tx);
                let mut conn = self.pool.acquire().await?;
                let existing = fetch_usage_log_by_request_id(&mut conn, &call.request_id)
                    .await?
                    .ok_or_else(|| {
                        GatewayError::internal("unique violation without existing usage log")
                    })?;
                return Ok(Recorded::Replayed(existing));
            }
            Err(e) => return Err(e),
        };
        log.id = log_id;

        let record = BillingRecord::usage(
            call.user_id,
            log_id,
            breakdown.total_cost,
            breakdown.currency.clone(),
        );
        let billing_id = insert_billing_record(&mut tx, &record).await?;

        let actual = ActualUnits {
            tokens: log.total_tokens,
            cost: breakdown.total_cost,
        };
        QuotaGovernor::commit_in_tx(&mut tx, reservation, &actual).await?;

        tx.commit().await?;

        info!(
            request_id = %log.request_id,
            usage_log_id = log_id,
            cost = %breakdown.total_cost,
            "usage recorded"
        );

        // Phase two: the debit. Failure here leaves the record pending for
        // the sweeper; the caller still gets the upstream answer.
        match self.billing.get_by_id(billing_id).await {
            Ok(Some(record)) => {
                if let Err(e) = super::settle_billing(&self.pool, &record).await {
                    warn!(
                        billing_id,
                        "debit failed, leaving record pending: {}", e
                    );
                }
            }
            Ok(None) => error!(billing_id, "billing record vanished before settle"),
            Err(e) => warn!(billing_id, "billing lookup failed before settle: {}", e),
        }

        Ok(Recorded::Fresh(log))
    }

    /// Record a forward that was admitted but failed upstream: an audit row
    /// with zero cost and no billing record.
    pub async fn record_failure(&self, call: CompletedCall) -> Result<UsageLog> {
        let mut log = build_log(&call, Utc::now());
        log.cost = Decimal::ZERO;

        let mut tx = self.pool.begin().await?;
        if let Some(existing) = fetch_usage_log_by_request_id(&mut tx, &call.request_id).await? {
            return Ok(existing);
        }
        let log_id = insert_usage_log(&mut tx, &log).await?;
        tx.commit().await?;

        log.id = log_id;
        Ok(log)
    }
}

fn build_log(call: &CompletedCall, created_at: chrono::DateTime<Utc>) -> UsageLog {
    UsageLog {
        id: 0,
        user_id: call.user_id,
        credential_id: call.credential_id,
        provider_id: call.provider_id,
        model_id: call.model_id,
        request_id: call.request_id.clone(),
        method: call.method.clone(),
        endpoint: call.endpoint.clone(),
        input_tokens: call.input_tokens,
        output_tokens: call.output_tokens,
        total_tokens: call.input_tokens + call.output_tokens,
        request_size: call.request_size,
        response_size: call.response_size,
        duration_ms: call.duration_ms,
        status_code: call.status_code,
        error_message: call.error_message.clone(),
        cost: Decimal::ZERO,
        created_at,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.message().contains("UNIQUE"))
        .unwrap_or(false)
}
