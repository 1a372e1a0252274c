// Quota & rate governor: check-then-tentatively-reserve admission over
// per-credential buckets, one storage transaction per check.

pub mod window;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::domain::{
    Credential, GatewayError, Quota, QuotaKind, QuotaPeriod, Result, User,
};
use crate::storage::models::period_key;
use crate::storage::repository::{adjust_bucket_value, fetch_bucket_value, store_bucket_value};
use crate::storage::QuotaRepository;

pub use window::window_for;

/// Bucket id for governor-synthesized limits (credential permission caps);
/// never a real quota row.
pub const SYNTHETIC_RPM_QUOTA_ID: i64 = 0;

/// A-priori request dimensions presented at admission. Requests are always 1;
/// tokens carry an estimate reconciled at commit; cost is usually 0 until the
/// actual price is known.
#[derive(Debug, Clone)]
pub struct RequestedUnits {
    pub tokens_estimate: i64,
    pub cost_estimate: Decimal,
}

#[derive(Debug, Clone)]
pub struct ReservationEntry {
    pub quota_id: i64,
    pub kind: QuotaKind,
    pub period_key: String,
    pub period_end: Option<DateTime<Utc>>,
    pub reserved: Decimal,
}

/// The tentative increments applied at admission; reconciled by commit or
/// returned by release.
#[derive(Debug, Clone, Default)]
pub struct Reservation {
    pub credential_id: i64,
    pub entries: Vec<ReservationEntry>,
}

/// Actual dimensions measured after forwarding.
#[derive(Debug, Clone)]
pub struct ActualUnits {
    pub tokens: i64,
    pub cost: Decimal,
}

struct BucketCheck {
    quota_id: i64,
    kind: QuotaKind,
    period: Option<QuotaPeriod>,
    reset_time: Option<String>,
    limit: Decimal,
    reserve: Decimal,
}

pub struct QuotaGovernor {
    pool: Pool<Sqlite>,
    quotas: crate::storage::SqliteQuotaRepository,
}

impl QuotaGovernor {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let quotas = crate::storage::SqliteQuotaRepository::new(pool.clone());
        Self { pool, quotas }
    }

    /// Admit or deny one request. On admission every relevant bucket holds
    /// the tentative reservation; on denial the transaction is rolled back
    /// and nothing persists.
    pub async fn check(
        &self,
        user: &User,
        credential: &Credential,
        requested: &RequestedUnits,
    ) -> Result<Reservation> {
        let now = Utc::now();

        if !user.can_make_request() {
            if user.status != crate::domain::UserStatus::Active {
                return Err(GatewayError::AuthRevoked);
            }
            return Err(GatewayError::QuotaExceeded {
                reason: "insufficient balance".to_string(),
                retry_after_seconds: None,
            });
        }

        if let Some(perms) = &credential.permissions {
            if let Some(cap) = perms.max_tokens_per_request {
                if requested.tokens_estimate > cap {
                    return Err(GatewayError::QuotaExceeded {
                        reason: format!(
                            "request exceeds per-request token cap ({} > {})",
                            requested.tokens_estimate, cap
                        ),
                        retry_after_seconds: None,
                    });
                }
            }
        }

        let checks = self.collect_checks(credential, requested).await?;
        if checks.is_empty() {
            return Ok(Reservation {
                credential_id: credential.id,
                entries: Vec::new(),
            });
        }

        let mut tx = self.pool.begin().await?;
        let mut entries = Vec::with_capacity(checks.len());

        for check in &checks {
            let (key, period_end) = match check.period {
                Some(period) => {
                    let (start, end) =
                        window_for(period, check.reset_time.as_deref(), now);
                    (period_key(Some(start)), Some(end))
                }
                None => (period_key(None), None),
            };

            let current = fetch_bucket_value(&mut tx, credential.id, check.quota_id, &key)
                .await?
                .unwrap_or(Decimal::ZERO);
            let next = current + check.reserve;

            if next > check.limit {
                // Dropping the transaction rolls back every reservation.
                debug!(
                    credential_id = credential.id,
                    quota_id = check.quota_id,
                    kind = check.kind.as_str(),
                    "admission denied: {} + {} > {}",
                    current,
                    check.reserve,
                    check.limit
                );
                return Err(denial(check, period_end, now));
            }

            let end_key = period_end.map(|e| period_key(Some(e)));
            store_bucket_value(
                &mut tx,
                credential.id,
                check.quota_id,
                &key,
                end_key.as_deref(),
                next,
            )
            .await?;

            entries.push(ReservationEntry {
                quota_id: check.quota_id,
                kind: check.kind,
                period_key: key,
                period_end,
                reserved: check.reserve,
            });
        }

        tx.commit().await?;

        Ok(Reservation {
            credential_id: credential.id,
            entries,
        })
    }

    async fn collect_checks(
        &self,
        credential: &Credential,
        requested: &RequestedUnits,
    ) -> Result<Vec<BucketCheck>> {
        let mut quotas = self.quotas.list_active_for_credential(credential.id).await?;

        // At most one active quota should exist per (kind, period); if
        // duplicates slip in, the latest-created row wins.
        quotas.sort_by_key(|q| q.id);
        let mut latest: std::collections::HashMap<(QuotaKind, Option<QuotaPeriod>), Quota> =
            std::collections::HashMap::new();
        for quota in quotas {
            latest.insert((quota.kind, quota.period), quota);
        }

        let mut checks: Vec<BucketCheck> = latest
            .values()
            .map(|q| BucketCheck {
                quota_id: q.id,
                kind: q.kind,
                period: q.period,
                reset_time: q.reset_time.clone(),
                limit: q.limit,
                reserve: reserve_for(q, requested),
            })
            .collect();

        if let Some(cap) = credential
            .permissions
            .as_ref()
            .and_then(|p| p.max_requests_per_minute)
        {
            checks.push(BucketCheck {
                quota_id: SYNTHETIC_RPM_QUOTA_ID,
                kind: QuotaKind::Requests,
                period: Some(QuotaPeriod::Minute),
                reset_time: None,
                limit: Decimal::from(cap),
                reserve: Decimal::ONE,
            });
        }

        Ok(checks)
    }

    /// Reconcile reservations with measured dimensions inside the caller's
    /// accounting transaction.
    pub async fn commit_in_tx(
        conn: &mut SqliteConnection,
        reservation: &Reservation,
        actual: &ActualUnits,
    ) -> Result<()> {
        for entry in &reservation.entries {
            let actual_value = match entry.kind {
                QuotaKind::Requests => Decimal::ONE,
                QuotaKind::Tokens => Decimal::from(actual.tokens),
                QuotaKind::Cost => actual.cost,
            };
            let delta = actual_value - entry.reserved;
            if delta.is_zero() {
                continue;
            }
            let end_key = entry.period_end.map(|e| period_key(Some(e)));
            adjust_bucket_value(
                conn,
                reservation.credential_id,
                entry.quota_id,
                &entry.period_key,
                end_key.as_deref(),
                delta,
            )
            .await?;
        }
        Ok(())
    }

    /// Return the full reservation: forwarding failed before any upstream
    /// bytes were consumed.
    pub async fn release(&self, reservation: &Reservation) -> Result<()> {
        if reservation.entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in &reservation.entries {
            let end_key = entry.period_end.map(|e| period_key(Some(e)));
            adjust_bucket_value(
                &mut tx,
                reservation.credential_id,
                entry.quota_id,
                &entry.period_key,
                end_key.as_deref(),
                -entry.reserved,
            )
            .await?;
        }
        tx.commit().await?;

        info!(
            credential_id = reservation.credential_id,
            entries = reservation.entries.len(),
            "released reservation"
        );
        Ok(())
    }
}

fn reserve_for(quota: &Quota, requested: &RequestedUnits) -> Decimal {
    match quota.kind {
        QuotaKind::Requests => Decimal::ONE,
        QuotaKind::Tokens => Decimal::from(requested.tokens_estimate),
        QuotaKind::Cost => requested.cost_estimate,
    }
}

/// RateLimited covers minute/hour request windows; everything else is
/// QuotaExceeded. Period denials carry the seconds until the window rolls.
fn denial(check: &BucketCheck, period_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> GatewayError {
    let retry_after = period_end.map(|end| (end - now).num_seconds().max(0));

    let fairness_window = matches!(
        check.period,
        Some(QuotaPeriod::Minute) | Some(QuotaPeriod::Hour)
    );

    if check.kind == QuotaKind::Requests && fairness_window {
        GatewayError::RateLimited {
            reason: format!(
                "{} per {} limit of {} reached",
                check.kind.as_str(),
                check.period.map(|p| p.as_str()).unwrap_or("total"),
                check.limit
            ),
            retry_after_seconds: retry_after.unwrap_or(0),
        }
    } else {
        GatewayError::QuotaExceeded {
            reason: format!(
                "{} {} limit of {} reached",
                check.kind.as_str(),
                check
                    .period
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| "total".to_string()),
                check.limit
            ),
            retry_after_seconds: retry_after,
        }
    }
}
