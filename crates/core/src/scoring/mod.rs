//! Rebound-opportunity scoring.
//!
//! Everything here is pure: identical inputs produce bit-identical outputs.
//! A missing input never fails the asset. Performance and momentum fall back
//! to [`NEUTRAL`]; a missing drawdown counts as no drawdown, so an asset
//! without data never outranks one with a real dip.

pub mod advice;
pub mod ranking;
pub mod stats;

use crate::domain::asset::AssetSnapshot;
use crate::domain::period::Period;
use crate::domain::ranking::ScoreComponents;

pub const NEUTRAL: f64 = 50.0;
pub const MAX_SCORE: f64 = 100.0;

pub const PERFORMANCE_WEIGHT: f64 = 0.25;
pub const DRAWDOWN_WEIGHT: f64 = 0.20;
pub const REBOUND_WEIGHT: f64 = 0.35;
pub const MOMENTUM_WEIGHT: f64 = 0.20;

/// Total of an asset with no data for the period: neutral performance and
/// momentum, zero drawdown and rebound.
pub const MISSING_DATA_TOTAL: f64 = (PERFORMANCE_WEIGHT + MOMENTUM_WEIGHT) * NEUTRAL;

/// Percentage change at which performance reaches ~88 (tanh(1)).
const PERFORMANCE_SCALE_PCT: f64 = 50.0;
/// Drawdown at which the drawdown score reaches ~63 (1 - 1/e).
const DRAWDOWN_SCALE_PCT: f64 = 25.0;
/// Share of the peak-to-current gap a rebound must win back.
const RECOVERY_TARGET: f64 = 0.75;
/// Lifts the rebound curve so its maximum (near a 31% drawdown) lands just
/// under 100.
const REBOUND_GAIN: f64 = 1.97;
/// Short-minus-long spread (percentage points) at which momentum reaches ~88.
const MOMENTUM_SCALE_PCT: f64 = 25.0;

/// Numeric inputs to the scoring functions, already extracted for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreInputs {
    pub change_pct: Option<f64>,
    pub drawdown_pct: Option<f64>,
    pub short_change_pct: Option<f64>,
    pub long_change_pct: Option<f64>,
}

impl ScoreInputs {
    pub fn from_snapshot(asset: &AssetSnapshot, period: Period) -> Self {
        let (short, long) = period.momentum_pair();
        Self {
            change_pct: asset.change(period),
            drawdown_pct: drawdown_pct(asset, period),
            short_change_pct: asset.change(short),
            long_change_pct: asset.change(long),
        }
    }
}

/// Scores one asset for one period.
pub fn score(asset: &AssetSnapshot, period: Period) -> ScoreComponents {
    score_inputs(ScoreInputs::from_snapshot(asset, period))
}

pub fn score_inputs(inputs: ScoreInputs) -> ScoreComponents {
    let performance = performance_score(inputs.change_pct);
    let drawdown_pct = inputs.drawdown_pct.unwrap_or(0.0);
    let drawdown = drawdown_score(drawdown_pct);
    let rebound_potential = rebound_potential_score(drawdown_pct);
    let momentum = momentum_score(inputs.short_change_pct, inputs.long_change_pct);

    ScoreComponents {
        performance,
        drawdown,
        rebound_potential,
        momentum,
        total: weighted_total(performance, drawdown, rebound_potential, momentum),
    }
}

pub fn weighted_total(performance: f64, drawdown: f64, rebound_potential: f64, momentum: f64) -> f64 {
    clamp_score(
        PERFORMANCE_WEIGHT * performance
            + DRAWDOWN_WEIGHT * drawdown
            + REBOUND_WEIGHT * rebound_potential
            + MOMENTUM_WEIGHT * momentum,
    )
}

/// 0% maps to 50; gains saturate toward 100 and losses toward 0.
pub fn performance_score(change_pct: Option<f64>) -> f64 {
    match finite_or_inf(change_pct) {
        Some(pct) => clamp_score(NEUTRAL + NEUTRAL * (pct / PERFORMANCE_SCALE_PCT).tanh()),
        None => NEUTRAL,
    }
}

/// Deeper drawdown means more room to rebound, so a higher score.
pub fn drawdown_score(drawdown_pct: f64) -> f64 {
    let dd = clamp_pct(drawdown_pct);
    clamp_score(MAX_SCORE * (1.0 - (-dd / DRAWDOWN_SCALE_PCT).exp()))
}

/// Drawdown depth discounted by how implausible the recovery is.
///
/// The recovery reference is [`RECOVERY_TARGET`] of the way back to the prior
/// peak. A shallow dip scores low because there is little to win back; a
/// collapse scores low because the required rise is implausible.
pub fn rebound_potential_score(drawdown_pct: f64) -> f64 {
    let dd = clamp_pct(drawdown_pct);
    if dd >= MAX_SCORE {
        return 0.0;
    }
    let required_rise = RECOVERY_TARGET * dd / (MAX_SCORE - dd);
    clamp_score(REBOUND_GAIN * drawdown_score(dd) * (-required_rise).exp())
}

/// Short window outperforming the long window (acceleration) scores above 50.
pub fn momentum_score(short_pct: Option<f64>, long_pct: Option<f64>) -> f64 {
    let (Some(short), Some(long)) = (finite_or_inf(short_pct), finite_or_inf(long_pct)) else {
        return NEUTRAL;
    };
    let spread = short - long;
    if spread.is_nan() {
        // inf - inf: both windows saturated the same way.
        return NEUTRAL;
    }
    clamp_score(NEUTRAL + NEUTRAL * (spread / MOMENTUM_SCALE_PCT).tanh())
}

/// Peak-to-current decline over the period window, in percent.
///
/// Each window no longer than `period` implies a past price relative to now of
/// `1 / (1 + pct/100)`; the rolling high is the largest of those and today.
/// Returns `None` when the period's own change is missing.
pub fn drawdown_pct(asset: &AssetSnapshot, period: Period) -> Option<f64> {
    asset.change(period)?;

    let mut peak_ratio: f64 = 1.0;
    for p in period.within() {
        let Some(pct) = asset.change(p) else {
            continue;
        };
        let growth = 1.0 + pct / 100.0;
        if growth <= 0.0 {
            // Price went to zero (or below) from a positive level.
            return Some(MAX_SCORE);
        }
        let ratio = 1.0 / growth;
        if ratio.is_finite() && ratio > peak_ratio {
            peak_ratio = ratio;
        }
    }

    Some(clamp_pct(MAX_SCORE * (1.0 - 1.0 / peak_ratio)))
}

fn finite_or_inf(v: Option<f64>) -> Option<f64> {
    v.filter(|x| !x.is_nan())
}

fn clamp_pct(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, MAX_SCORE)
    }
}

fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        NEUTRAL
    } else {
        v.clamp(0.0, MAX_SCORE)
    }
}
