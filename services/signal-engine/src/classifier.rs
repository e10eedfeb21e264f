//! Signal classifier - ordered rules over (fundamental, technical)
//!
//! Rules run in fixed priority order and the first match wins:
//!
//! 1. Accumulation: F >= 0.70 and T >= 0.60
//! 2. DCA: F >= 0.80 and T >= 0.40
//! 3. Distribution: F < 0.40 or T < 0.30
//! 4. otherwise no signal
//!
//! Rules 1 and 2 overlap (F >= 0.80, T >= 0.60 satisfies both) and ordering
//! resolves it to Accumulation. Some reachable inputs, e.g. F = T = 0.5, match
//! nothing and produce no signal. Sentiment is carried, never branched on.

use crate::signal::{ContributionCadence, InvestmentHorizon, SignalCategory};
use crate::types::ScoreResult;

pub const ACCUMULATION_MIN_FUNDAMENTAL: f64 = 0.70;
pub const ACCUMULATION_MIN_TECHNICAL: f64 = 0.60;
pub const ACCUMULATION_MAX_ALLOCATION: f64 = 0.10;
pub const ACCUMULATION_ALLOCATION_FACTOR: f64 = 0.15;
pub const ACCUMULATION_MAX_POSITION: f64 = 0.15;
pub const ACCUMULATION_STOP_LOSS: f64 = 0.30;

pub const DCA_MIN_FUNDAMENTAL: f64 = 0.80;
pub const DCA_MIN_TECHNICAL: f64 = 0.40;
pub const DCA_MAX_ALLOCATION: f64 = 0.05;
pub const DCA_ALLOCATION_FACTOR: f64 = 0.08;
pub const DCA_MAX_POSITION: f64 = 0.10;
pub const DCA_STOP_LOSS: f64 = 0.50;

pub const DISTRIBUTION_FUNDAMENTAL_BELOW: f64 = 0.40;
pub const DISTRIBUTION_TECHNICAL_BELOW: f64 = 0.30;
pub const DISTRIBUTION_STOP_LOSS: f64 = 0.20;

/// Category plus the investment parameters attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: SignalCategory,
    pub horizon: InvestmentHorizon,
    pub recommended_allocation: f64,
    pub cadence: Option<ContributionCadence>,
    pub max_position_size: f64,
    pub stop_loss: f64,
    /// Rule identifier
    pub rule: &'static str,
    pub reason: String,
}

/// Classify one instrument's scores; `None` when no rule matches
pub fn classify(scores: &ScoreResult) -> Option<Classification> {
    let f = scores.fundamental;
    let t = scores.technical;

    if f >= ACCUMULATION_MIN_FUNDAMENTAL && t >= ACCUMULATION_MIN_TECHNICAL {
        return Some(Classification {
            category: SignalCategory::Accumulation,
            horizon: InvestmentHorizon::MediumTerm,
            recommended_allocation: ACCUMULATION_MAX_ALLOCATION
                .min(f * ACCUMULATION_ALLOCATION_FACTOR),
            cadence: Some(ContributionCadence::Monthly),
            max_position_size: ACCUMULATION_MAX_POSITION,
            stop_loss: ACCUMULATION_STOP_LOSS,
            rule: "accumulation",
            reason: format!(
                "Strong fundamentals ({:.2}) and technicals ({:.2})",
                f, t
            ),
        });
    }

    if f >= DCA_MIN_FUNDAMENTAL && t >= DCA_MIN_TECHNICAL {
        return Some(Classification {
            category: SignalCategory::Dca,
            horizon: InvestmentHorizon::LongTerm,
            recommended_allocation: DCA_MAX_ALLOCATION.min(f * DCA_ALLOCATION_FACTOR),
            cadence: Some(ContributionCadence::Weekly),
            max_position_size: DCA_MAX_POSITION,
            stop_loss: DCA_STOP_LOSS,
            rule: "dca",
            reason: format!(
                "Excellent fundamentals ({:.2}) with volatile technicals ({:.2})",
                f, t
            ),
        });
    }

    if f < DISTRIBUTION_FUNDAMENTAL_BELOW || t < DISTRIBUTION_TECHNICAL_BELOW {
        return Some(Classification {
            category: SignalCategory::Distribution,
            horizon: InvestmentHorizon::ShortTerm,
            recommended_allocation: 0.0,
            cadence: None,
            max_position_size: 0.0,
            stop_loss: DISTRIBUTION_STOP_LOSS,
            rule: "distribution",
            reason: format!(
                "Weak fundamentals ({:.2}) or technicals ({:.2})",
                f, t
            ),
        });
    }

    None
}
