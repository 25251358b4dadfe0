use crate::domain::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Four normalized sub-scores plus their weighted total, all in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    #[serde(rename = "performance_score")]
    pub performance: f64,
    #[serde(rename = "drawdown_score")]
    pub drawdown: f64,
    #[serde(rename = "rebound_potential_score")]
    pub rebound_potential: f64,
    #[serde(rename = "momentum_score")]
    pub momentum: f64,
    #[serde(rename = "total_score")]
    pub total: f64,
}

/// Scored and ranked record for one asset within one period of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAsset {
    pub rank: i32,
    pub asset_id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub change_pct: Option<f64>,
    pub drawdown_pct: Option<f64>,
    #[serde(flatten)]
    pub scores: ScoreComponents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub asset_count: i32,
}

/// Every period's ranking produced by one refresh cycle. Immutable once built;
/// the next cycle replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub meta: GenerationMeta,
    pub rankings: BTreeMap<Period, Vec<RankedAsset>>,
}

impl Generation {
    pub fn ranking(&self, period: Period) -> &[RankedAsset] {
        self.rankings
            .get(&period)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Read-side view: one period of the latest committed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRanking {
    pub period: Period,
    pub generation: GenerationMeta,
    pub entries: Vec<RankedAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScoreRecord {
    pub period: Period,
    pub generation: GenerationMeta,
    pub entry: RankedAsset,
}
