//! End-to-end batch harness
//!
//! Drives the full pipeline against mock providers and in-memory storage:
//! providers → scorer → classifier → persist → translate → publish


use chrono::Utc;
use mock_providers::{FlakySignalRepository, FlakySink, MockScoreProvider, COMPOSITE};
use signal_engine::observability::metrics;
use signal_engine::repository::{
    InMemoryInstrumentRepository, InMemorySignalRepository, InMemoryTradingSignalSink,
};
use signal_engine::{
    classify, BatchOrchestrator, Dimension, DimensionWeights, Eligibility, EngineConfig,
    EngineError, FailureStage, Instrument, InstrumentOutcome, RetryConfig, ScoreProviders,
    ScoreResult, ShutdownSignal, Signal, SignalAnalysis, SignalCategory, SignalRepository,
    SignalStrength, TradingSignalSink, TradingSignalType, WeightConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn composite_weights() -> WeightConfig {
    WeightConfig::from_pairs(&[(COMPOSITE, 1.0)])
}

fn test_config() -> EngineConfig {
    EngineConfig {
        weights: DimensionWeights {
            fundamental: composite_weights(),
            technical: composite_weights(),
            sentiment: composite_weights(),
        },
        eligibility: Eligibility {
            require_active: true,
            symbols: vec![],
        },
        pool_size: 4,
        instrument_timeout_ms: 1_000,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        },
        signal_ttl_days: 30,
    }
}

/// Mock world shared across runs
struct Harness {
    instruments: InMemoryInstrumentRepository,
    signals: InMemorySignalRepository,
    sink: InMemoryTradingSignalSink,
    fundamental: Arc<MockScoreProvider>,
    technical: Arc<MockScoreProvider>,
    sentiment: Arc<MockScoreProvider>,
}

impl Harness {
    fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            instruments: InMemoryInstrumentRepository::new(instruments),
            signals: InMemorySignalRepository::new(),
            sink: InMemoryTradingSignalSink::new(),
            fundamental: Arc::new(MockScoreProvider::new(Dimension::Fundamental)),
            technical: Arc::new(MockScoreProvider::new(Dimension::Technical)),
            sentiment: Arc::new(MockScoreProvider::new(Dimension::Sentiment)),
        }
    }

    fn set(&self, symbol: &str, f: f64, t: f64, s: f64) {
        self.fundamental.set_score(symbol, f);
        self.technical.set_score(symbol, t);
        self.sentiment.set_score(symbol, s);
    }

    fn providers(&self) -> ScoreProviders {
        ScoreProviders {
            fundamental: self.fundamental.clone(),
            technical: self.technical.clone(),
            sentiment: self.sentiment.clone(),
        }
    }

    fn orchestrator(&self, config: EngineConfig) -> BatchOrchestrator {
        self.orchestrator_with(config, Arc::new(self.signals.clone()))
    }

    fn orchestrator_with(
        &self,
        config: EngineConfig,
        signals: Arc<dyn SignalRepository>,
    ) -> BatchOrchestrator {
        self.orchestrator_with_sink(config, signals, Arc::new(self.sink.clone()))
    }

    fn orchestrator_with_sink(
        &self,
        config: EngineConfig,
        signals: Arc<dyn SignalRepository>,
        sink: Arc<dyn TradingSignalSink>,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(
            config,
            self.providers(),
            Arc::new(self.instruments.clone()),
            signals,
            sink,
        )
        .unwrap()
    }
}

fn activated_id(outcome: Option<&InstrumentOutcome>) -> uuid::Uuid {
    match outcome {
        Some(InstrumentOutcome::Activated { signal_id, .. }) => *signal_id,
        other => panic!("expected activation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_classifies_universe() {
    let instruments = vec![
        Instrument::new("AAPL"),
        Instrument::new("MSFT"),
        Instrument::new("WEAK"),
        Instrument::new("GAP"),
    ];
    let harness = Harness::new(instruments);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    harness.set("MSFT", 0.85, 0.50, 0.40);
    harness.set("WEAK", 0.39, 0.50, 0.90);
    harness.set("GAP", 0.50, 0.50, 0.50);

    let summary = harness
        .orchestrator(test_config())
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    assert_eq!(summary.total(), 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.no_signal, 1);
    assert_eq!(summary.activated.get(&SignalCategory::Accumulation), Some(&1));
    assert_eq!(summary.activated.get(&SignalCategory::Dca), Some(&1));
    assert_eq!(summary.activated.get(&SignalCategory::Distribution), Some(&1));
    assert_eq!(summary.outcome_for("GAP"), Some(&InstrumentOutcome::NoSignal));

    // Three signals stored, three trading signals published
    assert_eq!(harness.signals.len().await, 3);
    assert_eq!(harness.sink.len().await, 3);

    let aapl_id = activated_id(summary.outcome_for("AAPL"));
    let published = harness.sink.get(aapl_id).await.unwrap();
    assert_eq!(published.signal_type, TradingSignalType::StrongBuy);
    assert_eq!(published.strength, SignalStrength::Moderate);
    assert!((published.confidence - 0.645).abs() < 1e-9);
    assert_eq!(published.metadata.recommended_allocation, 0.10);

    let msft_id = activated_id(summary.outcome_for("MSFT"));
    let published = harness.sink.get(msft_id).await.unwrap();
    assert_eq!(published.signal_type, TradingSignalType::Buy);
    assert_eq!(published.metadata.recommended_allocation, 0.05);
}

#[tokio::test]
async fn test_rerun_with_unchanged_inputs_is_idempotent() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    let orchestrator = harness.orchestrator(test_config());

    let first = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    let signal_id = activated_id(first.outcome_for("AAPL"));

    let second = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    assert_eq!(
        second.outcome_for("AAPL"),
        Some(&InstrumentOutcome::Unchanged {
            signal_id,
            category: SignalCategory::Accumulation,
        })
    );
    assert_eq!(second.unchanged, 1);

    // Same active set, no new row
    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, signal_id);
    assert_eq!(harness.signals.history(aapl.id).await.len(), 1);

    // Publishing is an upsert keyed by the signal
    assert_eq!(harness.sink.len().await, 1);
    assert_eq!(harness.sink.publish_count().await, 2);
    assert_eq!(
        orchestrator.metrics().get_counter(metrics::SIGNALS_UNCHANGED).await,
        1
    );
}

#[tokio::test]
async fn test_changed_scores_supersede_same_category() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    let orchestrator = harness.orchestrator(test_config());

    let first = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    let old_id = activated_id(first.outcome_for("AAPL"));

    harness.set("AAPL", 0.90, 0.70, 0.50);
    let second = orchestrator.run(&ShutdownSignal::new()).await.unwrap();

    match second.outcome_for("AAPL") {
        Some(InstrumentOutcome::Activated { category, superseded, .. }) => {
            assert_eq!(*category, SignalCategory::Accumulation);
            assert_eq!(superseded, &vec![old_id]);
        }
        other => panic!("expected activation, got {:?}", other),
    }

    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, old_id);
    assert_eq!(harness.signals.history(aapl.id).await.len(), 2);
}

#[tokio::test]
async fn test_new_category_supersedes_other_categories() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    let orchestrator = harness.orchestrator(test_config());

    let first = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    let accumulation_id = activated_id(first.outcome_for("AAPL"));

    harness.set("AAPL", 0.30, 0.65, 0.50);
    let second = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    assert_eq!(second.superseded, 1);

    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].category, SignalCategory::Distribution);
    assert!(harness
        .signals
        .find_active(aapl.id, SignalCategory::Accumulation)
        .await
        .unwrap()
        .is_none());

    let history = harness.signals.history(aapl.id).await;
    assert!(history.iter().any(|s| s.id == accumulation_id && !s.is_active));
}

#[tokio::test]
async fn test_no_signal_leaves_existing_signal_active() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    let orchestrator = harness.orchestrator(test_config());

    let first = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    let signal_id = activated_id(first.outcome_for("AAPL"));

    harness.set("AAPL", 0.50, 0.50, 0.50);
    let second = orchestrator.run(&ShutdownSignal::new()).await.unwrap();
    assert_eq!(second.outcome_for("AAPL"), Some(&InstrumentOutcome::NoSignal));

    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, signal_id);
}

#[tokio::test]
async fn test_provider_failure_is_isolated() {
    let harness = Harness::new(vec![
        Instrument::new("AAPL"),
        Instrument::new("BAD"),
        Instrument::new("MSFT"),
    ]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    harness.set("MSFT", 0.85, 0.50, 0.40);
    harness.set("BAD", 0.75, 0.65, 0.50);
    harness.technical.fail_for("BAD");

    let summary = harness
        .orchestrator(test_config())
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].symbol, "BAD");
    assert_eq!(summary.failures[0].stage, FailureStage::Provider);
    assert!(summary.failures[0].reason.contains("simulated outage"));
    assert_eq!(harness.signals.len().await, 2);
}

#[tokio::test]
async fn test_provider_timeout_skips_instrument() {
    let harness = Harness::new(vec![Instrument::new("AAPL"), Instrument::new("SLOW")]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    harness.set("SLOW", 0.75, 0.65, 0.50);
    harness.sentiment.delay_for("SLOW", Duration::from_millis(500));

    let mut config = test_config();
    config.instrument_timeout_ms = 50;

    let orchestrator = harness.orchestrator(config);
    let summary = orchestrator.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    match summary.outcome_for("SLOW") {
        Some(InstrumentOutcome::Failed { stage, .. }) => assert_eq!(*stage, FailureStage::Timeout),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(orchestrator.metrics().get_counter(metrics::TIMEOUTS).await, 1);
}

#[tokio::test]
async fn test_key_mismatch_fails_instrument() {
    let harness = Harness::new(vec![Instrument::new("AAPL")]);
    harness.fundamental.rename_factor("roe");

    let summary = harness
        .orchestrator(test_config())
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].stage, FailureStage::Scoring);
    assert!(summary.failures[0].reason.contains("roe"));
    assert!(harness.signals.is_empty().await);
}

#[tokio::test]
async fn test_eligibility_predicate() {
    let mut inactive = Instrument::new("IDLE");
    inactive.is_active = false;
    let mut short_only = Instrument::new("SHORT");
    short_only.supports_long_horizon = false;

    let harness = Harness::new(vec![
        Instrument::new("AAPL"),
        Instrument::new("MSFT"),
        inactive,
        short_only,
    ]);

    let mut config = test_config();
    config.eligibility.symbols = vec!["aapl".to_string(), "IDLE".to_string()];

    let summary = harness
        .orchestrator(config)
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    // SHORT is never listed; MSFT and IDLE fail the predicate
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.outcome_for("IDLE"), Some(&InstrumentOutcome::Ineligible));
    assert_eq!(summary.outcome_for("MSFT"), Some(&InstrumentOutcome::Ineligible));
    assert!(summary.outcome_for("SHORT").is_none());
    assert_eq!(harness.fundamental.calls(), 1);
}

#[tokio::test]
async fn test_pool_bounds_concurrency() {
    let symbols = ["A1", "A2", "A3", "A4", "A5", "A6"];
    let harness = Harness::new(symbols.iter().map(|s| Instrument::new(s)).collect());
    for symbol in symbols {
        harness.fundamental.delay_for(symbol, Duration::from_millis(30));
    }

    let mut config = test_config();
    config.pool_size = 2;

    let summary = harness
        .orchestrator(config)
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    assert_eq!(summary.total(), 6);
    assert!(harness.fundamental.max_in_flight() <= 2);
    assert_eq!(harness.fundamental.calls(), 6);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let harness = Harness::new(vec![Instrument::new("AAPL"), Instrument::new("MSFT")]);
    harness.set("AAPL", 0.75, 0.65, 0.50);

    let shutdown = ShutdownSignal::new();
    shutdown.trigger();

    let summary = harness.orchestrator(test_config()).run(&shutdown).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.outcome_for("AAPL"), Some(&InstrumentOutcome::Cancelled));
    assert_eq!(harness.fundamental.calls(), 0);
    assert!(harness.signals.is_empty().await);
    assert!(harness.sink.is_empty().await);
}

#[tokio::test]
async fn test_cancel_mid_run_finishes_in_flight() {
    let harness = Harness::new(vec![
        Instrument::new("AAA"),
        Instrument::new("BBB"),
        Instrument::new("CCC"),
    ]);
    harness.set("AAA", 0.75, 0.65, 0.50);
    harness.fundamental.delay_for("AAA", Duration::from_millis(200));

    let mut config = test_config();
    config.pool_size = 1;
    let orchestrator = harness.orchestrator(config);

    let shutdown = ShutdownSignal::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    let summary = orchestrator.run(&shutdown).await.unwrap();

    assert!(summary.cancelled);
    assert!(matches!(
        summary.outcome_for("AAA"),
        Some(InstrumentOutcome::Activated { .. })
    ));
    assert_eq!(summary.outcome_for("BBB"), Some(&InstrumentOutcome::Cancelled));
    assert_eq!(summary.outcome_for("CCC"), Some(&InstrumentOutcome::Cancelled));
    assert_eq!(harness.signals.len().await, 1);
}

#[tokio::test]
async fn test_persistence_retry_recovers() {
    let harness = Harness::new(vec![Instrument::new("AAPL")]);
    harness.set("AAPL", 0.75, 0.65, 0.50);

    let flaky = Arc::new(FlakySignalRepository::new(harness.signals.clone(), 2));
    let orchestrator = harness.orchestrator_with(test_config(), flaky.clone());

    let summary = orchestrator.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(flaky.activate_calls(), 3);
    assert_eq!(harness.signals.len().await, 1);
    assert_eq!(
        orchestrator.metrics().get_counter(metrics::PERSISTENCE_RETRIES).await,
        2
    );
}

#[tokio::test]
async fn test_persistence_exhaustion_records_failure() {
    let harness = Harness::new(vec![Instrument::new("AAPL")]);
    harness.set("AAPL", 0.75, 0.65, 0.50);

    let flaky = Arc::new(FlakySignalRepository::new(harness.signals.clone(), u32::MAX));
    let orchestrator = harness.orchestrator_with(test_config(), flaky.clone());

    let summary = orchestrator.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].stage, FailureStage::Persistence);
    assert!(summary.failures[0].reason.contains("connection reset"));
    assert_eq!(flaky.activate_calls(), 3);
    assert!(harness.signals.is_empty().await);
    assert!(harness.sink.is_empty().await);

    let metrics_view = orchestrator.metrics();
    assert_eq!(metrics_view.get_counter(metrics::PERSISTENCE_FAILURES).await, 1);
    assert_eq!(metrics_view.get_counter(metrics::PERSISTENCE_RETRIES).await, 2);
}

#[tokio::test]
async fn test_expiry_sweep_failure_does_not_abort_batch() {
    let harness = Harness::new(vec![Instrument::new("AAPL"), Instrument::new("MSFT")]);
    harness.set("AAPL", 0.75, 0.65, 0.50);
    harness.set("MSFT", 0.85, 0.50, 0.40);

    let flaky =
        Arc::new(FlakySignalRepository::new(harness.signals.clone(), 0).with_failing_sweep());
    let orchestrator = harness.orchestrator_with(test_config(), flaky.clone());

    let summary = orchestrator.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(flaky.sweep_calls(), 3);
    assert_eq!(summary.expired, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.activated.get(&SignalCategory::Accumulation), Some(&1));
    assert_eq!(summary.activated.get(&SignalCategory::Dca), Some(&1));
    assert_eq!(harness.signals.len().await, 2);
    assert_eq!(harness.sink.len().await, 2);

    let metrics_view = orchestrator.metrics();
    assert_eq!(metrics_view.get_counter(metrics::SWEEP_FAILURES).await, 1);
    assert_eq!(metrics_view.get_counter(metrics::PERSISTENCE_RETRIES).await, 2);
    assert_eq!(metrics_view.get_counter(metrics::SIGNALS_EXPIRED).await, 0);
}

#[tokio::test]
async fn test_publish_failure_republished_on_next_run() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);

    let sink = FlakySink::new(harness.sink.clone());
    let signals: Arc<dyn SignalRepository> = Arc::new(harness.signals.clone());

    // Sink down: signal is stored but never reaches the sink
    let first =
        harness.orchestrator_with_sink(test_config(), signals.clone(), Arc::new(sink.clone()));
    let summary = first.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].stage, FailureStage::Publish);
    assert!(summary.failures[0].reason.contains("sink unavailable"));
    assert_eq!(sink.attempts(), 3);
    assert!(harness.sink.is_empty().await);
    assert_eq!(first.metrics().get_counter(metrics::PUBLISH_FAILURES).await, 1);

    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1, "signal stays active after publish failure");
    let stored = active[0].clone();
    assert_eq!(stored.category, SignalCategory::Accumulation);

    // Sink back: the same signal is kept and published
    sink.recover();
    let second = harness.orchestrator_with_sink(test_config(), signals, Arc::new(sink.clone()));
    let summary = second.run(&ShutdownSignal::new()).await.unwrap();

    assert_eq!(summary.failed, 0);
    assert_eq!(
        summary.outcome_for("AAPL"),
        Some(&InstrumentOutcome::Unchanged {
            signal_id: stored.id,
            category: SignalCategory::Accumulation,
        })
    );
    assert_eq!(harness.signals.history(aapl.id).await.len(), 1);

    let published = harness.sink.get(stored.id).await.expect("published on rerun");
    assert_eq!(published.signal_type, TradingSignalType::StrongBuy);
    assert_eq!(harness.sink.publish_count().await, 1);
}

#[tokio::test]
async fn test_expired_signal_is_replaced_not_kept() {
    let aapl = Instrument::new("AAPL");
    let harness = Harness::new(vec![aapl.clone()]);
    harness.set("AAPL", 0.75, 0.65, 0.50);

    // Identical classification, but created past its TTL
    let scores = ScoreResult::new(0.75, 0.65, 0.50);
    let classification = classify(&scores).unwrap();
    let stale = Signal::from_classification(
        &aapl,
        &classification,
        &scores,
        SignalAnalysis::default(),
        Utc::now() - chrono::Duration::days(45),
        chrono::Duration::days(30),
    );
    harness.signals.save(&stale).await.unwrap();

    let summary = harness
        .orchestrator(test_config())
        .run(&ShutdownSignal::new())
        .await
        .unwrap();

    assert_eq!(summary.expired, 1);
    let fresh_id = activated_id(summary.outcome_for("AAPL"));
    assert_ne!(fresh_id, stale.id);

    let active = harness.signals.active_for(aapl.id).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, fresh_id);
}

#[tokio::test]
async fn test_invalid_configuration_rejected() {
    let harness = Harness::new(vec![]);

    let mut config = test_config();
    config.weights.technical = WeightConfig::from_pairs(&[(COMPOSITE, 0.9)]);
    let result = BatchOrchestrator::new(
        config,
        harness.providers(),
        Arc::new(harness.instruments.clone()),
        Arc::new(harness.signals.clone()),
        Arc::new(harness.sink.clone()),
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    let mut config = test_config();
    config.pool_size = 0;
    let result = BatchOrchestrator::new(
        config,
        harness.providers(),
        Arc::new(harness.instruments.clone()),
        Arc::new(harness.signals.clone()),
        Arc::new(harness.sink.clone()),
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    // Providers wired to the wrong dimensions
    let mut providers = harness.providers();
    std::mem::swap(&mut providers.fundamental, &mut providers.technical);
    let result = BatchOrchestrator::new(
        test_config(),
        providers,
        Arc::new(harness.instruments.clone()),
        Arc::new(harness.signals.clone()),
        Arc::new(harness.sink.clone()),
    );
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}
