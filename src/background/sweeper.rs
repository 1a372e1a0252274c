// Billing sweeper: drains pending billing records whose request-path
// debit did not land.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::accounting::settle_billing;
use crate::config::SweeperConfig;
use crate::domain::Result;
use crate::storage::{BillingRepository, SqliteBillingRepository};

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub examined: usize,
    pub settled: usize,
    pub failed: usize,
}

pub struct BillingSweeper {
    pool: Pool<Sqlite>,
    billing: SqliteBillingRepository,
    config: SweeperConfig,
}

impl BillingSweeper {
    pub fn new(pool: Pool<Sqlite>, config: SweeperConfig) -> Self {
        let billing = SqliteBillingRepository::new(pool.clone());
        Self {
            pool,
            billing,
            config,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            "billing sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(stats) if stats.examined > 0 => {
                            info!(
                                examined = stats.examined,
                                settled = stats.settled,
                                failed = stats.failed,
                                "billing sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!("billing sweep failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("billing sweeper stopping");
                    return;
                }
            }
        }
    }

    /// One drain pass: settle up to `batch_size` pending records older than
    /// the grace window; persistent failures are marked `failed` for the
    /// operator.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.grace_secs);
        let pending = self
            .billing
            .list_pending(cutoff, self.config.batch_size)
            .await?;

        let mut stats = SweepStats {
            examined: pending.len(),
            ..Default::default()
        };

        for record in pending {
            match settle_billing(&self.pool, &record).await {
                Ok(()) => stats.settled += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        billing_id = record.id,
                        user_id = record.user_id,
                        amount = %record.amount,
                        "debit retry failed, marking failed: {}",
                        e
                    );
                    self.billing.mark_failed(record.id).await?;
                }
            }
        }

        Ok(stats)
    }

    /// Operator path: push a failed record back to pending for the next pass.
    pub async fn retry_failed(&self, billing_id: i64) -> Result<()> {
        self.billing.mark_pending(billing_id).await
    }
}
