//! Shared input types: instruments, factor sets and dimension scores

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Tradable instrument (owned by the instrument repository, read only here)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Instrument {
    pub id: Uuid,
    pub symbol: String,
    /// Instrument takes part in long-horizon evaluation
    pub supports_long_horizon: bool,
    pub is_active: bool,
}

impl Instrument {
    pub fn new(symbol: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            supports_long_horizon: true,
            is_active: true,
        }
    }
}

/// Analysis dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Fundamental,
    Technical,
    Sentiment,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Dimension::Fundamental,
        Dimension::Technical,
        Dimension::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Fundamental => "fundamental",
            Dimension::Technical => "technical",
            Dimension::Sentiment => "sentiment",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named factor breakdown for one dimension, each factor nominally in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSet {
    pub dimension: Dimension,
    pub factors: BTreeMap<String, f64>,
}

impl FactorSet {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            factors: BTreeMap::new(),
        }
    }

    pub fn with_factor(mut self, name: &str, value: f64) -> Self {
        self.factors.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.factors.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// The three raw factor sets fetched for one instrument
#[derive(Debug, Clone)]
pub struct FactorBundle {
    pub fundamental: FactorSet,
    pub technical: FactorSet,
    pub sentiment: FactorSet,
}

/// Aggregated dimension scores for one instrument at one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub fundamental: f64,
    pub technical: f64,
    pub sentiment: f64,
}

impl ScoreResult {
    /// Build a result, clamping every score into [0, 1]
    pub fn new(fundamental: f64, technical: f64, sentiment: f64) -> Self {
        Self {
            fundamental: fundamental.clamp(0.0, 1.0),
            technical: technical.clamp(0.0, 1.0),
            sentiment: sentiment.clamp(0.0, 1.0),
        }
    }
}
