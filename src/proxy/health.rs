// Rolling per-provider attempt history, fed by the proxy and read by the
// health prober.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

const WINDOW: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    pub success: bool,
    pub duration_ms: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptStats {
    pub total: usize,
    pub failures: usize,
    pub avg_duration_ms: i64,
}

/// Shared rolling view of recent upstream attempts, single writer per entry
/// being unnecessary: entries are append-only ring buffers.
#[derive(Default)]
pub struct AttemptFeed {
    inner: RwLock<HashMap<i64, VecDeque<Attempt>>>,
}

impl AttemptFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn record(&self, provider_id: i64, success: bool, duration_ms: i64) {
        let mut inner = self.inner.write().await;
        let ring = inner.entry(provider_id).or_default();
        if ring.len() == WINDOW {
            ring.pop_front();
        }
        ring.push_back(Attempt {
            success,
            duration_ms,
            at: Utc::now(),
        });
    }

    pub async fn stats(&self, provider_id: i64) -> AttemptStats {
        let inner = self.inner.read().await;
        let Some(ring) = inner.get(&provider_id) else {
            return AttemptStats::default();
        };
        let total = ring.len();
        let failures = ring.iter().filter(|a| !a.success).count();
        let avg_duration_ms = if total == 0 {
            0
        } else {
            ring.iter().map(|a| a.duration_ms).sum::<i64>() / total as i64
        };
        AttemptStats {
            total,
            failures,
            avg_duration_ms,
        }
    }
}
