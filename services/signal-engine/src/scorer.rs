//! Weighted factor aggregation
//!
//! Collapses a named-factor breakdown into a single dimension score:
//! `clamp(Σ factor[k] · weight[k], 0, 1)`. Pure and deterministic; factors are
//! visited in key order so identical inputs always produce identical bits.

use tracing::warn;

use crate::config::{DimensionWeights, WeightConfig};
use crate::error::{EngineError, Result};
use crate::types::{Dimension, FactorBundle, FactorSet, ScoreResult};

/// Scorer for one dimension, holding a validated weight map
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    dimension: Dimension,
    weights: WeightConfig,
}

impl WeightedScorer {
    /// Create a scorer; fails with `InvalidConfig` if weights don't sum to 1.0
    pub fn new(dimension: Dimension, weights: WeightConfig) -> Result<Self> {
        weights.validate(dimension)?;
        Ok(Self { dimension, weights })
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Aggregate a factor set into a dimension score in [0, 1]
    pub fn score(&self, factors: &FactorSet) -> Result<f64> {
        if factors.dimension != self.dimension {
            return Err(EngineError::InvalidConfig(format!(
                "{} scorer received {} factors",
                self.dimension, factors.dimension
            )));
        }
        weighted_score(factors, &self.weights)
    }
}

/// `clamp(Σ factor[k] · weight[k], 0, 1)` over identical key sets
pub fn weighted_score(factors: &FactorSet, weights: &WeightConfig) -> Result<f64> {
    weights.validate(factors.dimension)?;
    check_keys(factors, weights)?;

    let total: f64 = weights
        .weights()
        .iter()
        .map(|(name, weight)| {
            let raw = factors.get(name).unwrap_or(0.0);
            clamp_factor(factors.dimension, name, raw) * weight
        })
        .sum();

    Ok(total.clamp(0.0, 1.0))
}

fn check_keys(factors: &FactorSet, weights: &WeightConfig) -> Result<()> {
    let missing: Vec<&str> = weights
        .weights()
        .keys()
        .filter(|k| !factors.factors.contains_key(*k))
        .map(String::as_str)
        .collect();
    let unexpected: Vec<&str> = factors
        .factors
        .keys()
        .filter(|k| weights.get(k).is_none())
        .map(String::as_str)
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    Err(EngineError::InvalidConfig(format!(
        "{} factor keys do not match weights (missing: [{}], unexpected: [{}])",
        factors.dimension,
        missing.join(", "),
        unexpected.join(", ")
    )))
}

/// Out-of-range factors are clamped rather than rejected
fn clamp_factor(dimension: Dimension, name: &str, value: f64) -> f64 {
    if !value.is_finite() {
        warn!(%dimension, factor = %name, value, "Non-finite factor value, treating as 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        warn!(%dimension, factor = %name, value, "Factor value outside [0, 1], clamping");
        return value.clamp(0.0, 1.0);
    }
    value
}

/// One scorer per dimension
#[derive(Debug, Clone)]
pub struct DimensionScorers {
    fundamental: WeightedScorer,
    technical: WeightedScorer,
    sentiment: WeightedScorer,
}

impl DimensionScorers {
    pub fn new(weights: &DimensionWeights) -> Result<Self> {
        Ok(Self {
            fundamental: WeightedScorer::new(Dimension::Fundamental, weights.fundamental.clone())?,
            technical: WeightedScorer::new(Dimension::Technical, weights.technical.clone())?,
            sentiment: WeightedScorer::new(Dimension::Sentiment, weights.sentiment.clone())?,
        })
    }

    /// Score all three dimensions of one instrument
    pub fn score(&self, bundle: &FactorBundle) -> Result<ScoreResult> {
        Ok(ScoreResult::new(
            self.fundamental.score(&bundle.fundamental)?,
            self.technical.score(&bundle.technical)?,
            self.sentiment.score(&bundle.sentiment)?,
        ))
    }
}
