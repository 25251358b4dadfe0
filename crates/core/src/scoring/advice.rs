use crate::domain::period::Period;
use crate::domain::ranking::RankedAsset;
use serde::{Deserialize, Serialize};

const HIGH_RISK_DRAWDOWN_PCT: f64 = 50.0;
const HIGH_RISK_MARKET_CAP: f64 = 10_000_000.0;
const MEDIUM_RISK_DRAWDOWN_PCT: f64 = 30.0;
const MEDIUM_RISK_MARKET_CAP: f64 = 100_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    StrongBuy,
    Buy,
    Watch,
    Avoid,
}

impl RecommendedAction {
    pub fn describe(self) -> &'static str {
        match self {
            RecommendedAction::StrongBuy => "Great rebound opportunity",
            RecommendedAction::Buy => "Good opportunity with caution",
            RecommendedAction::Watch => "Monitor for entry point",
            RecommendedAction::Avoid => "Low probability opportunity",
        }
    }
}

pub fn risk_level(drawdown_pct: Option<f64>, market_cap: f64) -> RiskLevel {
    let dd = drawdown_pct.unwrap_or(0.0);
    if dd > HIGH_RISK_DRAWDOWN_PCT || market_cap.is_nan() || market_cap < HIGH_RISK_MARKET_CAP {
        RiskLevel::High
    } else if dd > MEDIUM_RISK_DRAWDOWN_PCT || market_cap < MEDIUM_RISK_MARKET_CAP {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn recommended_action(total: f64, risk: RiskLevel, drawdown_pct: Option<f64>) -> RecommendedAction {
    let dd = drawdown_pct.unwrap_or(0.0);
    if total > 70.0 && matches!(risk, RiskLevel::Low | RiskLevel::Medium) {
        RecommendedAction::StrongBuy
    } else if total > 50.0 && dd > 20.0 {
        RecommendedAction::Buy
    } else if total > 30.0 {
        RecommendedAction::Watch
    } else {
        RecommendedAction::Avoid
    }
}

/// Ranking entry with its derived risk and recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    #[serde(flatten)]
    pub entry: RankedAsset,
    pub risk_level: RiskLevel,
    pub recommended_action: RecommendedAction,
    pub action_note: &'static str,
}

impl From<RankedAsset> for Opportunity {
    fn from(entry: RankedAsset) -> Self {
        let risk = risk_level(entry.drawdown_pct, entry.market_cap);
        let action = recommended_action(entry.scores.total, risk, entry.drawdown_pct);
        Self {
            entry,
            risk_level: risk,
            recommended_action: action,
            action_note: action.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityFilter {
    pub period: Period,
    pub min_drawdown: f64,
    pub max_drawdown: f64,
    pub min_market_cap: f64,
    pub min_volume: f64,
    pub top_n: usize,
}

impl Default for OpportunityFilter {
    fn default() -> Self {
        Self {
            period: Period::DEFAULT,
            min_drawdown: 10.0,
            max_drawdown: 80.0,
            min_market_cap: 1_000_000.0,
            min_volume: 100_000.0,
            top_n: 50,
        }
    }
}

impl OpportunityFilter {
    pub fn matches(&self, entry: &RankedAsset) -> bool {
        let Some(dd) = entry.drawdown_pct else {
            return false;
        };
        dd >= self.min_drawdown
            && dd <= self.max_drawdown
            && entry.market_cap >= self.min_market_cap
            && entry.volume_24h >= self.min_volume
    }

    /// Keeps matching entries in rank order, truncated to `top_n`.
    pub fn apply(&self, entries: Vec<RankedAsset>) -> Vec<Opportunity> {
        let mut entries: Vec<RankedAsset> = entries.into_iter().filter(|e| self.matches(e)).collect();
        entries.sort_by_key(|e| e.rank);
        entries
            .into_iter()
            .take(self.top_n)
            .map(Opportunity::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ranking::ScoreComponents;

    fn entry(rank: i32, total: f64, drawdown_pct: Option<f64>, market_cap: f64, volume_24h: f64) -> RankedAsset {
        RankedAsset {
            rank,
            asset_id: format!("asset-{rank}"),
            symbol: format!("A{rank}"),
            name: format!("Asset {rank}"),
            price: 1.0,
            market_cap,
            volume_24h,
            change_pct: drawdown_pct.map(|d| -d),
            drawdown_pct,
            scores: ScoreComponents {
                performance: total,
                drawdown: total,
                rebound_potential: total,
                momentum: total,
                total,
            },
        }
    }

    #[test]
    fn risk_levels_follow_drawdown_and_cap_thresholds() {
        assert_eq!(risk_level(Some(55.0), 1.0e10), RiskLevel::High);
        assert_eq!(risk_level(Some(5.0), 5.0e6), RiskLevel::High);
        assert_eq!(risk_level(Some(35.0), 1.0e10), RiskLevel::Medium);
        assert_eq!(risk_level(Some(5.0), 5.0e7), RiskLevel::Medium);
        assert_eq!(risk_level(Some(5.0), 1.0e10), RiskLevel::Low);
        assert_eq!(risk_level(None, 0.0), RiskLevel::High);
        assert_eq!(risk_level(None, -1.0), RiskLevel::High);
        assert_eq!(risk_level(None, f64::NAN), RiskLevel::High);
    }

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(recommended_action(75.0, RiskLevel::Low, Some(5.0)), RecommendedAction::StrongBuy);
        assert_eq!(recommended_action(75.0, RiskLevel::High, Some(25.0)), RecommendedAction::Buy);
        assert_eq!(recommended_action(55.0, RiskLevel::Low, Some(10.0)), RecommendedAction::Watch);
        assert_eq!(recommended_action(20.0, RiskLevel::Low, None), RecommendedAction::Avoid);
    }

    #[test]
    fn serializes_screaming_case() {
        let v = serde_json::to_value(RecommendedAction::StrongBuy).unwrap();
        assert_eq!(v, serde_json::json!("STRONG_BUY"));
        let v = serde_json::to_value(RiskLevel::Medium).unwrap();
        assert_eq!(v, serde_json::json!("MEDIUM"));
    }

    #[test]
    fn filter_applies_bounds_and_top_n_in_rank_order() {
        let entries = vec![
            entry(3, 60.0, Some(25.0), 1.0e9, 1.0e7),
            entry(1, 80.0, Some(40.0), 1.0e9, 1.0e7),
            entry(2, 70.0, Some(90.0), 1.0e9, 1.0e7),
            entry(4, 50.0, Some(15.0), 5.0e5, 1.0e7),
            entry(5, 45.0, Some(15.0), 1.0e9, 1.0e3),
            entry(6, 40.0, None, 1.0e9, 1.0e7),
            entry(7, 35.0, Some(12.0), 1.0e9, 1.0e7),
        ];
        let filter = OpportunityFilter {
            top_n: 2,
            ..OpportunityFilter::default()
        };
        let out = filter.apply(entries);
        let ranks: Vec<i32> = out.iter().map(|o| o.entry.rank).collect();
        assert_eq!(ranks, vec![1, 3]);
        assert_eq!(out[0].recommended_action, RecommendedAction::StrongBuy);
    }

    #[test]
    fn filter_deserializes_with_defaults() {
        let f: OpportunityFilter = serde_json::from_value(serde_json::json!({"period": "7d", "top_n": 5})).unwrap();
        assert_eq!(f.period, Period::Days7);
        assert_eq!(f.top_n, 5);
        assert_eq!(f.min_drawdown, 10.0);
    }
}
