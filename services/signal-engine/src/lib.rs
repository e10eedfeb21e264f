//! Signal Engine Library
//!
//! Long-horizon signal generation: weighted factor scoring, rule-based
//! classification, translation to generic trading signals and batch
//! evaluation over the instrument universe.

pub mod classifier;
pub mod config;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod providers;
pub mod repository;
pub mod retry;
pub mod scorer;
pub mod signal;
pub mod translator;
pub mod types;

// Re-export main types for convenience
pub use classifier::{classify, Classification};
pub use config::{
    DimensionWeights, Eligibility, EngineConfig, ProviderEndpoints, RetryConfig, ServiceConfig,
    WeightConfig,
};
pub use error::{EngineError, Result};
pub use observability::{MetricsCollector, MetricsSnapshot};
pub use orchestrator::{
    BatchOrchestrator, FailureStage, InstrumentFailure, InstrumentOutcome, RunSummary,
    ScoreProviders, ShutdownSignal,
};
pub use providers::{HttpScoreProvider, ScoreProvider};
pub use repository::{InstrumentRepository, SignalRepository, TradingSignalSink};
pub use scorer::{weighted_score, DimensionScorers, WeightedScorer};
pub use signal::{
    ContributionCadence, InvestmentHorizon, PriceTargets, Signal, SignalAnalysis, SignalCategory,
};
pub use translator::{translate, GenericTradingSignal, SignalStrength, TradingSignalType};
pub use types::{Dimension, FactorBundle, FactorSet, Instrument, ScoreResult};
