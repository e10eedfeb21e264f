//! Batch orchestrator - evaluates the eligible universe on a bounded worker pool
//!
//! Each instrument runs fetch -> score -> classify -> persist -> publish in its
//! own task. A failure at any stage is recorded against that instrument and
//! the batch carries on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::classify;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::observability::{metrics, MetricsCollector};
use crate::providers::ScoreProvider;
use crate::repository::{InstrumentRepository, SignalRepository, TradingSignalSink};
use crate::retry::with_retry;
use crate::scorer::DimensionScorers;
use crate::signal::{Signal, SignalAnalysis, SignalCategory};
use crate::translator::translate;
use crate::types::{Dimension, FactorBundle, Instrument};

/// One provider per dimension
#[derive(Clone)]
pub struct ScoreProviders {
    pub fundamental: Arc<dyn ScoreProvider>,
    pub technical: Arc<dyn ScoreProvider>,
    pub sentiment: Arc<dyn ScoreProvider>,
}

impl ScoreProviders {
    /// Reject a provider wired to the wrong dimension
    pub fn validate(&self) -> Result<()> {
        let wiring = [
            (Dimension::Fundamental, &self.fundamental),
            (Dimension::Technical, &self.technical),
            (Dimension::Sentiment, &self.sentiment),
        ];
        for (expected, provider) in wiring {
            if provider.dimension() != expected {
                return Err(EngineError::InvalidConfig(format!(
                    "provider '{}' serves {} but is wired as {}",
                    provider.name(),
                    provider.dimension(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

/// Cooperative cancellation flag, checked between instruments
#[derive(Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage at which an instrument's evaluation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Provider,
    Timeout,
    Scoring,
    Persistence,
    Publish,
    Task,
}

/// Result of evaluating one instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    /// New signal stored; `superseded` lists the signals it replaced
    Activated {
        signal_id: Uuid,
        category: SignalCategory,
        superseded: Vec<Uuid>,
    },
    /// Identical live signal already active, kept as is
    Unchanged {
        signal_id: Uuid,
        category: SignalCategory,
    },
    /// No rule matched; existing signals untouched
    NoSignal,
    Ineligible,
    Cancelled,
    Failed { stage: FailureStage, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentResult {
    pub instrument_id: Uuid,
    pub symbol: String,
    #[serde(flatten)]
    pub outcome: InstrumentOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentFailure {
    pub instrument_id: Uuid,
    pub symbol: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Aggregate report of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Activated, unchanged or no-signal
    pub succeeded: usize,
    /// Ineligible or cancelled
    pub skipped: usize,
    pub failed: usize,
    pub activated: BTreeMap<SignalCategory, usize>,
    pub unchanged: usize,
    pub no_signal: usize,
    pub superseded: usize,
    /// Signals deactivated by the expiry sweep
    pub expired: u64,
    pub cancelled: bool,
    pub failures: Vec<InstrumentFailure>,
    pub results: Vec<InstrumentResult>,
}

impl RunSummary {
    fn new(run_id: Uuid, started_at: DateTime<Utc>, expired: u64) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            activated: BTreeMap::new(),
            unchanged: 0,
            no_signal: 0,
            superseded: 0,
            expired,
            cancelled: false,
            failures: Vec::new(),
            results: Vec::new(),
        }
    }

    fn record(&mut self, instrument_id: Uuid, symbol: String, outcome: InstrumentOutcome) {
        match &outcome {
            InstrumentOutcome::Activated { category, superseded, .. } => {
                self.succeeded += 1;
                *self.activated.entry(*category).or_insert(0) += 1;
                self.superseded += superseded.len();
            }
            InstrumentOutcome::Unchanged { .. } => {
                self.succeeded += 1;
                self.unchanged += 1;
            }
            InstrumentOutcome::NoSignal => {
                self.succeeded += 1;
                self.no_signal += 1;
            }
            InstrumentOutcome::Ineligible => self.skipped += 1,
            InstrumentOutcome::Cancelled => {
                self.skipped += 1;
                self.cancelled = true;
            }
            InstrumentOutcome::Failed { stage, reason } => {
                self.failed += 1;
                self.failures.push(InstrumentFailure {
                    instrument_id,
                    symbol: symbol.clone(),
                    stage: *stage,
                    reason: reason.clone(),
                });
            }
        }
        self.results.push(InstrumentResult {
            instrument_id,
            symbol,
            outcome,
        });
    }

    /// Outcome recorded for a symbol
    pub fn outcome_for(&self, symbol: &str) -> Option<&InstrumentOutcome> {
        self.results
            .iter()
            .find(|r| r.symbol == symbol)
            .map(|r| &r.outcome)
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    fn finish(&mut self) {
        self.results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.finished_at = Utc::now();
    }
}

/// Per-instrument evaluation, shared by every worker task
struct Pipeline {
    config: EngineConfig,
    scorers: DimensionScorers,
    providers: ScoreProviders,
    signals: Arc<dyn SignalRepository>,
    sink: Arc<dyn TradingSignalSink>,
    metrics: MetricsCollector,
}

impl Pipeline {
    async fn evaluate(&self, instrument: &Instrument) -> InstrumentOutcome {
        self.metrics.increment(metrics::INSTRUMENTS_EVALUATED, 1).await;

        let factors = match self.fetch_factors(instrument).await {
            Ok(factors) => factors,
            Err(outcome) => return outcome,
        };

        let scores = match self.scorers.score(&factors) {
            Ok(scores) => scores,
            Err(e) => {
                warn!(symbol = %instrument.symbol, error = %e, "Scoring failed");
                self.metrics.increment(metrics::SCORING_FAILURES, 1).await;
                return InstrumentOutcome::Failed {
                    stage: FailureStage::Scoring,
                    reason: e.to_string(),
                };
            }
        };

        let Some(classification) = classify(&scores) else {
            debug!(
                symbol = %instrument.symbol,
                fundamental = scores.fundamental,
                technical = scores.technical,
                "No classification rule matched"
            );
            self.metrics.increment(metrics::NO_SIGNAL, 1).await;
            return InstrumentOutcome::NoSignal;
        };

        let now = Utc::now();
        let existing = match self.persist_step("find_active", || {
            self.signals.find_active(instrument.id, classification.category)
        })
        .await
        {
            Ok(existing) => existing,
            Err(outcome) => return outcome,
        };

        if let Some(existing) = existing {
            if existing.is_live(now) && existing.is_equivalent(&classification, &scores) {
                debug!(
                    symbol = %instrument.symbol,
                    category = %classification.category,
                    signal_id = %existing.id,
                    "Active signal unchanged"
                );
                self.metrics.increment(metrics::SIGNALS_UNCHANGED, 1).await;
                if let Err(outcome) = self.publish(&existing).await {
                    return outcome;
                }
                return InstrumentOutcome::Unchanged {
                    signal_id: existing.id,
                    category: existing.category,
                };
            }
        }

        let signal = Signal::from_classification(
            instrument,
            &classification,
            &scores,
            SignalAnalysis::new(&classification, &factors),
            now,
            self.config.signal_ttl(),
        );

        let superseded = match self
            .persist_step("activate", || self.signals.activate(&signal))
            .await
        {
            Ok(superseded) => superseded,
            Err(outcome) => return outcome,
        };

        info!(
            symbol = %instrument.symbol,
            category = %signal.category,
            signal_id = %signal.id,
            superseded = superseded.len(),
            fundamental = scores.fundamental,
            technical = scores.technical,
            sentiment = scores.sentiment,
            "Signal activated"
        );
        self.metrics.increment(metrics::SIGNALS_ACTIVATED, 1).await;
        self.metrics
            .increment(metrics::SIGNALS_SUPERSEDED, superseded.len() as u64)
            .await;

        if let Err(outcome) = self.publish(&signal).await {
            return outcome;
        }

        InstrumentOutcome::Activated {
            signal_id: signal.id,
            category: signal.category,
            superseded,
        }
    }

    /// Provider phase: all three dimensions concurrently, under one timeout
    async fn fetch_factors(
        &self,
        instrument: &Instrument,
    ) -> std::result::Result<FactorBundle, InstrumentOutcome> {
        let timeout = self.config.instrument_timeout();
        let fetch = async {
            tokio::try_join!(
                self.providers.fundamental.get_factors(instrument),
                self.providers.technical.get_factors(instrument),
                self.providers.sentiment.get_factors(instrument),
            )
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok((fundamental, technical, sentiment))) => Ok(FactorBundle {
                fundamental,
                technical,
                sentiment,
            }),
            Ok(Err(e)) => {
                warn!(symbol = %instrument.symbol, error = %e, "Provider failed");
                self.metrics.increment(metrics::PROVIDER_FAILURES, 1).await;
                Err(InstrumentOutcome::Failed {
                    stage: FailureStage::Provider,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                let e = EngineError::Timeout(timeout);
                warn!(symbol = %instrument.symbol, error = %e, "Provider phase timed out");
                self.metrics.increment(metrics::TIMEOUTS, 1).await;
                Err(InstrumentOutcome::Failed {
                    stage: FailureStage::Timeout,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn persist_step<F, Fut, T>(
        &self,
        label: &str,
        operation: F,
    ) -> std::result::Result<T, InstrumentOutcome>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut retries = 0u64;
        let result = with_retry(label, &self.config.retry, |_| retries += 1, operation).await;
        self.metrics
            .increment(metrics::PERSISTENCE_RETRIES, retries)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(operation = label, error = %e, "Persistence failed after retries");
                self.metrics.increment(metrics::PERSISTENCE_FAILURES, 1).await;
                Err(InstrumentOutcome::Failed {
                    stage: FailureStage::Persistence,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Deactivate expired signals. Liveness is also checked per instrument,
    /// so a sweep that keeps failing is logged and the batch goes on.
    async fn sweep_expired(&self, run_id: Uuid, now: DateTime<Utc>) -> u64 {
        let mut retries = 0u64;
        let result = with_retry(
            "expire_stale",
            &self.config.retry,
            |_| retries += 1,
            || self.signals.expire_stale(now),
        )
        .await;
        self.metrics
            .increment(metrics::PERSISTENCE_RETRIES, retries)
            .await;

        match result {
            Ok(expired) => {
                if expired > 0 {
                    info!(%run_id, expired, "Deactivated expired signals");
                    self.metrics.increment(metrics::SIGNALS_EXPIRED, expired).await;
                }
                expired
            }
            Err(e) => {
                error!(%run_id, error = %e, "Expiry sweep failed, continuing batch");
                self.metrics.increment(metrics::SWEEP_FAILURES, 1).await;
                0
            }
        }
    }

    /// Translate and publish; a translation that fails closed is not an error
    async fn publish(&self, signal: &Signal) -> std::result::Result<(), InstrumentOutcome> {
        let Some(generic) = translate(signal) else {
            self.metrics.increment(metrics::TRANSLATION_SKIPPED, 1).await;
            return Ok(());
        };

        let mut retries = 0u64;
        let result = with_retry(
            "publish",
            &self.config.retry,
            |_| retries += 1,
            || self.sink.publish(&generic),
        )
        .await;
        self.metrics.increment(metrics::PUBLISH_RETRIES, retries).await;

        if let Err(e) = result {
            error!(symbol = %signal.symbol, signal_id = %signal.id, error = %e, "Publish failed");
            self.metrics.increment(metrics::PUBLISH_FAILURES, 1).await;
            return Err(InstrumentOutcome::Failed {
                stage: FailureStage::Publish,
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

/// Runs a batch over every eligible instrument
pub struct BatchOrchestrator {
    pipeline: Arc<Pipeline>,
    instruments: Arc<dyn InstrumentRepository>,
}

impl BatchOrchestrator {
    /// Fails with `InvalidConfig` on unusable configuration or provider wiring
    pub fn new(
        config: EngineConfig,
        providers: ScoreProviders,
        instruments: Arc<dyn InstrumentRepository>,
        signals: Arc<dyn SignalRepository>,
        sink: Arc<dyn TradingSignalSink>,
    ) -> Result<Self> {
        config.validate()?;
        providers.validate()?;
        let scorers = DimensionScorers::new(&config.weights)?;

        Ok(Self {
            pipeline: Arc::new(Pipeline {
                config,
                scorers,
                providers,
                signals,
                sink,
                metrics: MetricsCollector::new(),
            }),
            instruments,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.pipeline.metrics
    }

    /// Evaluate the universe once. Errors only when instrument listing fails.
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pipeline = &self.pipeline;

        let expired = pipeline.sweep_expired(run_id, started_at).await;

        let listed = self.instruments.list_eligible().await?;
        info!(
            %run_id,
            instruments = listed.len(),
            pool_size = pipeline.config.pool_size,
            "Starting batch"
        );

        let mut summary = RunSummary::new(run_id, started_at, expired);
        let semaphore = Arc::new(Semaphore::new(pipeline.config.pool_size));
        let mut handles = Vec::new();

        for instrument in listed {
            if !pipeline.config.eligibility.allows(&instrument) {
                debug!(%run_id, symbol = %instrument.symbol, "Instrument not eligible");
                summary.record(instrument.id, instrument.symbol, InstrumentOutcome::Ineligible);
                continue;
            }

            if shutdown.is_triggered() {
                summary.record(instrument.id, instrument.symbol, InstrumentOutcome::Cancelled);
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    summary.record(instrument.id, instrument.symbol, InstrumentOutcome::Cancelled);
                    continue;
                }
            };

            // Shutdown may have arrived while waiting for a worker
            if shutdown.is_triggered() {
                drop(permit);
                summary.record(instrument.id, instrument.symbol, InstrumentOutcome::Cancelled);
                continue;
            }

            let pipeline = Arc::clone(pipeline);
            let id = instrument.id;
            let symbol = instrument.symbol.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                pipeline.evaluate(&instrument).await
            });
            handles.push((id, symbol, handle));
        }

        for (id, symbol, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%run_id, %symbol, error = %e, "Evaluation task failed");
                    InstrumentOutcome::Failed {
                        stage: FailureStage::Task,
                        reason: e.to_string(),
                    }
                }
            };
            summary.record(id, symbol, outcome);
        }

        summary.finish();

        if summary.cancelled {
            warn!(%run_id, "Batch cancelled before all instruments started");
        }
        info!(
            %run_id,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            unchanged = summary.unchanged,
            no_signal = summary.no_signal,
            superseded = summary.superseded,
            "Batch finished"
        );
        let snapshot = pipeline.metrics.snapshot().await;
        debug!(%run_id, counters = ?snapshot.counters, "Run metrics");

        Ok(summary)
    }
}
