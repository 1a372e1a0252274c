// Health prober: keeps provider health fresh so the selector only offers
// upstreams whose last probe succeeded.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::CacheHandle;
use crate::config::ProberConfig;
use crate::domain::{HealthStatus, Provider, Result};
use crate::proxy::AttemptFeed;
use crate::storage::{ProviderRepository, SqliteProviderRepository};

pub struct HealthProber {
    providers: SqliteProviderRepository,
    cache: CacheHandle,
    attempts: Arc<AttemptFeed>,
    client: reqwest::Client,
    config: ProberConfig,
}

impl HealthProber {
    pub fn new(
        providers: SqliteProviderRepository,
        cache: CacheHandle,
        attempts: Arc<AttemptFeed>,
        config: ProberConfig,
    ) -> Self {
        Self {
            providers,
            cache,
            attempts,
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval_secs,
            "health prober started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!("health probe tick failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("health prober stopping");
                    return;
                }
            }
        }
    }

    /// Probe every active provider whose interval has elapsed. Returns how
    /// many probes ran.
    pub async fn tick(&self) -> Result<usize> {
        let now = Utc::now();
        let providers = self.providers.list_active().await?;

        let mut probed = 0;
        for provider in providers.iter().filter(|p| p.probe_due(now)) {
            self.probe(provider).await?;
            probed += 1;
        }
        Ok(probed)
    }

    async fn probe(&self, provider: &Provider) -> Result<()> {
        let url = provider.probe_url();
        let healthy = match self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.probe_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(provider = %provider.slug, "probe error: {}", e);
                false
            }
        };

        let status = if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        let now = Utc::now();
        self.providers
            .update_health(provider.id, status, now)
            .await?;

        // The selector must observe the transition within one cache TTL.
        self.cache
            .invalidate(&format!("provider:{}", provider.id))
            .await;

        if status != provider.health_status {
            let recent = self.attempts.stats(provider.id).await;
            info!(
                provider = %provider.slug,
                from = provider.health_status.as_str(),
                to = status.as_str(),
                recent_attempts = recent.total,
                recent_failures = recent.failures,
                "provider health transition"
            );
        }

        Ok(())
    }
}
