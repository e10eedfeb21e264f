//! Observability: batch counters

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Counter collector shared by every evaluation task
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: BTreeMap<String, u64>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: BTreeMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub uptime_secs: u64,
}

/// Predefined metric names
pub mod metrics {
    // Evaluation outcomes
    pub const INSTRUMENTS_EVALUATED: &str = "instruments_evaluated_total";
    pub const SIGNALS_ACTIVATED: &str = "signals_activated_total";
    pub const SIGNALS_SUPERSEDED: &str = "signals_superseded_total";
    pub const SIGNALS_UNCHANGED: &str = "signals_unchanged_total";
    pub const SIGNALS_EXPIRED: &str = "signals_expired_total";
    pub const NO_SIGNAL: &str = "no_signal_total";

    // Failures
    pub const PROVIDER_FAILURES: &str = "provider_failures_total";
    pub const TIMEOUTS: &str = "instrument_timeouts_total";
    pub const SCORING_FAILURES: &str = "scoring_failures_total";
    pub const PERSISTENCE_FAILURES: &str = "persistence_failures_total";
    pub const SWEEP_FAILURES: &str = "expiry_sweep_failures_total";
    pub const PUBLISH_FAILURES: &str = "publish_failures_total";
    pub const TRANSLATION_SKIPPED: &str = "translation_skipped_total";

    // Retries
    pub const PERSISTENCE_RETRIES: &str = "persistence_retries_total";
    pub const PUBLISH_RETRIES: &str = "publish_retries_total";
}
