//! Long-horizon signals - output of the classifier, persisted per instrument

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::classifier::Classification;
use crate::types::{FactorBundle, Instrument, ScoreResult};

/// Signal category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize,
)]
#[sqlx(type_name = "signal_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCategory {
    /// Strong fundamentals and technicals - build a larger position monthly
    Accumulation,
    /// Solid but volatile - smaller weekly buys
    Dca,
    /// Weak fundamentals or technicals - sell/avoid
    Distribution,
    Hold,
    Rebalance,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 5] = [
        SignalCategory::Accumulation,
        SignalCategory::Dca,
        SignalCategory::Distribution,
        SignalCategory::Hold,
        SignalCategory::Rebalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Accumulation => "ACCUMULATION",
            SignalCategory::Dca => "DCA",
            SignalCategory::Distribution => "DISTRIBUTION",
            SignalCategory::Hold => "HOLD",
            SignalCategory::Rebalance => "REBALANCE",
        }
    }
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intended holding period bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "investment_horizon", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentHorizon {
    ShortTerm,
    /// 1-2 years
    MediumTerm,
    /// 2-5 years
    LongTerm,
}

impl InvestmentHorizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentHorizon::ShortTerm => "SHORT_TERM",
            InvestmentHorizon::MediumTerm => "MEDIUM_TERM",
            InvestmentHorizon::LongTerm => "LONG_TERM",
        }
    }
}

/// Scheduled contribution cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "contribution_cadence", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionCadence {
    Weekly,
    Monthly,
}

impl ContributionCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionCadence::Weekly => "WEEKLY",
            ContributionCadence::Monthly => "MONTHLY",
        }
    }
}

/// Price targets at 6, 12 and 24 months
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceTargets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub six_month: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twelve_month: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twenty_four_month: Option<Decimal>,
}

/// Analysis record stored with each signal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalAnalysis {
    /// Rule that matched
    pub rule: String,
    pub reason: String,
    pub fundamental_factors: BTreeMap<String, f64>,
    pub technical_factors: BTreeMap<String, f64>,
    pub sentiment_factors: BTreeMap<String, f64>,
}

impl SignalAnalysis {
    pub fn new(classification: &Classification, factors: &FactorBundle) -> Self {
        Self {
            rule: classification.rule.to_string(),
            reason: classification.reason.clone(),
            fundamental_factors: factors.fundamental.factors.clone(),
            technical_factors: factors.technical.factors.clone(),
            sentiment_factors: factors.sentiment.factors.clone(),
        }
    }
}

/// Long-horizon investment signal
///
/// Never mutated after creation except for `is_active` and `expires_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub symbol: String,
    pub category: SignalCategory,
    pub horizon: InvestmentHorizon,
    pub fundamental_score: f64,
    pub technical_score: f64,
    pub sentiment_score: f64,
    /// Fraction of the portfolio to allocate
    pub recommended_allocation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cadence: Option<ContributionCadence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_targets: Option<PriceTargets>,
    pub max_position_size: f64,
    /// Stop-loss as a fraction below entry
    pub stop_loss: f64,
    pub analysis: SignalAnalysis,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Signal {
    /// Build a fresh active signal from a classification
    pub fn from_classification(
        instrument: &Instrument,
        classification: &Classification,
        scores: &ScoreResult,
        analysis: SignalAnalysis,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument_id: instrument.id,
            symbol: instrument.symbol.clone(),
            category: classification.category,
            horizon: classification.horizon,
            fundamental_score: scores.fundamental,
            technical_score: scores.technical,
            sentiment_score: scores.sentiment,
            recommended_allocation: classification.recommended_allocation,
            cadence: classification.cadence,
            price_targets: None,
            max_position_size: classification.max_position_size,
            stop_loss: classification.stop_loss,
            analysis,
            is_active: true,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn with_price_targets(mut self, targets: PriceTargets) -> Self {
        self.price_targets = Some(targets);
        self
    }

    pub fn scores(&self) -> ScoreResult {
        ScoreResult {
            fundamental: self.fundamental_score,
            technical: self.technical_score,
            sentiment: self.sentiment_score,
        }
    }

    /// Active and not yet past its expiry
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Would re-classifying with these inputs produce this exact signal?
    pub fn is_equivalent(&self, classification: &Classification, scores: &ScoreResult) -> bool {
        self.category == classification.category
            && self.horizon == classification.horizon
            && self.cadence == classification.cadence
            && self.recommended_allocation == classification.recommended_allocation
            && self.max_position_size == classification.max_position_size
            && self.stop_loss == classification.stop_loss
            && self.scores() == *scores
    }
}
