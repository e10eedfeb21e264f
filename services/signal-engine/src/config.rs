//! Engine configuration
//!
//! Loaded from an optional config file layered under `SIGNAL_ENGINE__*`
//! environment variables. Weight maps, the eligibility predicate, the worker
//! pool size and the per-instrument timeout have no built-in defaults and are
//! validated before any batch may start.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::types::{Dimension, Instrument};

/// Allowed distance of a weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SIGNAL_ENGINE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "signal-engine.toml";
const ENV_PREFIX: &str = "SIGNAL_ENGINE";

/// Full service configuration (engine + adapters)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub database_url: String,
    pub providers: ProviderEndpoints,
    pub engine: EngineConfig,
}

impl ServiceConfig {
    /// Load from the file named by `SIGNAL_ENGINE_CONFIG` plus env overrides
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit file path plus env overrides, then validate
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let service: ServiceConfig = settings.try_deserialize()?;
        service.engine.validate()?;
        Ok(service)
    }
}

/// Base URLs of the three score providers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEndpoints {
    pub fundamental_url: String,
    pub technical_url: String,
    pub sentiment_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Configuration consumed by the batch orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub weights: DimensionWeights,
    pub eligibility: Eligibility,
    /// Max instruments evaluated concurrently
    pub pool_size: usize,
    /// Budget for one instrument's provider phase, in milliseconds
    pub instrument_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Lifetime of an activated signal
    #[serde(default = "default_signal_ttl_days")]
    pub signal_ttl_days: i64,
}

impl EngineConfig {
    /// Reject configuration the engine must not start with
    pub fn validate(&self) -> Result<()> {
        for dimension in Dimension::ALL {
            self.weights.for_dimension(dimension).validate(dimension)?;
        }

        if self.pool_size == 0 {
            return Err(EngineError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.instrument_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "instrument_timeout_ms must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.signal_ttl_days <= 0 {
            return Err(EngineError::InvalidConfig(
                "signal_ttl_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn instrument_timeout(&self) -> Duration {
        Duration::from_millis(self.instrument_timeout_ms)
    }

    pub fn signal_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.signal_ttl_days)
    }
}

/// Weight maps for all three dimensions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DimensionWeights {
    pub fundamental: WeightConfig,
    pub technical: WeightConfig,
    pub sentiment: WeightConfig,
}

impl DimensionWeights {
    pub fn for_dimension(&self, dimension: Dimension) -> &WeightConfig {
        match dimension {
            Dimension::Fundamental => &self.fundamental,
            Dimension::Technical => &self.technical,
            Dimension::Sentiment => &self.sentiment,
        }
    }
}

/// Factor name -> weight for one dimension
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct WeightConfig(BTreeMap<String, f64>);

impl WeightConfig {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(name, weight)| (name.to_string(), *weight))
                .collect(),
        )
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Weights must sum to 1.0 within [`WEIGHT_SUM_TOLERANCE`]
    pub fn validate(&self, dimension: Dimension) -> Result<()> {
        let sum = self.sum();
        if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::InvalidConfig(format!(
                "{} weights sum to {}, expected 1.0",
                dimension, sum
            )));
        }
        Ok(())
    }
}

/// Which listed instruments a batch evaluates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Eligibility {
    /// Skip instruments whose `is_active` flag is cleared
    pub require_active: bool,
    /// Symbol allow-list; empty means every symbol
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Eligibility {
    pub fn allows(&self, instrument: &Instrument) -> bool {
        if !instrument.supports_long_horizon {
            return false;
        }
        if self.require_active && !instrument.is_active {
            return false;
        }
        self.symbols.is_empty()
            || self
                .symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&instrument.symbol))
    }
}

/// Retry policy for persistence and publishing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_request_timeout_secs() -> u64 { 10 }
fn default_signal_ttl_days() -> i64 { 30 }
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 250 }
fn default_max_delay_ms() -> u64 { 2000 }
fn default_jitter() -> bool { true }
