//! Translation of long-horizon signals into the generic trading-signal format
//! shared with the short-horizon trading subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::signal::{ContributionCadence, InvestmentHorizon, Signal, SignalCategory};

/// Confidence weight of the fundamental score
pub const FUNDAMENTAL_CONFIDENCE_WEIGHT: f64 = 0.4;
pub const TECHNICAL_CONFIDENCE_WEIGHT: f64 = 0.3;
pub const SENTIMENT_CONFIDENCE_WEIGHT: f64 = 0.3;

/// Confidence at or above which a signal is `Strong`
pub const STRONG_CONFIDENCE: f64 = 0.70;

pub const LONG_TERM_TIMEFRAME: &str = "long_term";
pub const ACCUMULATION_ZONE: &str = "accumulation_zone";

/// Generic trading signal type (5-value scale)
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "trading_signal_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingSignalType {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

/// Coarse confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "signal_strength", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Strong,
    Moderate,
}

impl SignalStrength {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= STRONG_CONFIDENCE {
            SignalStrength::Strong
        } else {
            SignalStrength::Moderate
        }
    }
}

/// Parameters of the originating long-horizon signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignalMetadata {
    pub spot_signal_id: Uuid,
    pub investment_horizon: InvestmentHorizon,
    pub recommended_allocation: f64,
    pub dca_frequency: Option<ContributionCadence>,
    pub fundamental_score: f64,
    pub technical_score: f64,
    pub sentiment_score: f64,
}

/// Cross-system trading signal derived from a long-horizon signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericTradingSignal {
    pub instrument_id: Uuid,
    pub symbol: String,
    #[serde(rename = "type")]
    pub signal_type: TradingSignalType,
    pub strength: SignalStrength,
    pub confidence: f64,
    pub timeframe: String,
    pub entry_point_type: String,
    pub metadata: TradingSignalMetadata,
    pub generated_at: DateTime<Utc>,
}

/// Category -> generic type. Exhaustive: a new category will not compile
/// until it is mapped here.
pub fn signal_type_for(category: SignalCategory) -> TradingSignalType {
    match category {
        SignalCategory::Accumulation => TradingSignalType::StrongBuy,
        SignalCategory::Dca => TradingSignalType::Buy,
        SignalCategory::Distribution => TradingSignalType::Sell,
        SignalCategory::Hold => TradingSignalType::Hold,
        SignalCategory::Rebalance => TradingSignalType::Hold,
    }
}

/// `F·0.4 + T·0.3 + S·0.3`
pub fn confidence(fundamental: f64, technical: f64, sentiment: f64) -> f64 {
    fundamental * FUNDAMENTAL_CONFIDENCE_WEIGHT
        + technical * TECHNICAL_CONFIDENCE_WEIGHT
        + sentiment * SENTIMENT_CONFIDENCE_WEIGHT
}

/// Translate a signal; returns `None` (and logs) instead of failing when the
/// result would be unusable.
pub fn translate(signal: &Signal) -> Option<GenericTradingSignal> {
    let confidence = confidence(
        signal.fundamental_score,
        signal.technical_score,
        signal.sentiment_score,
    );

    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        warn!(
            signal_id = %signal.id,
            symbol = %signal.symbol,
            category = %signal.category,
            confidence,
            "Skipping translation: confidence outside [0, 1]"
        );
        return None;
    }

    Some(GenericTradingSignal {
        instrument_id: signal.instrument_id,
        symbol: signal.symbol.clone(),
        signal_type: signal_type_for(signal.category),
        strength: SignalStrength::from_confidence(confidence),
        confidence,
        timeframe: LONG_TERM_TIMEFRAME.to_string(),
        entry_point_type: ACCUMULATION_ZONE.to_string(),
        metadata: TradingSignalMetadata {
            spot_signal_id: signal.id,
            investment_horizon: signal.horizon,
            recommended_allocation: signal.recommended_allocation,
            dca_frequency: signal.cadence,
            fundamental_score: signal.fundamental_score,
            technical_score: signal.technical_score,
            sentiment_score: signal.sentiment_score,
        },
        generated_at: Utc::now(),
    })
}
