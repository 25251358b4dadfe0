use crate::domain::period::Period;
use crate::domain::ranking::{GenerationMeta, RankedAsset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const OPPORTUNITY_DRAWDOWN_PCT: f64 = 10.0;
const HIGH_SCORE_TOTAL: f64 = 50.0;
const BEARISH_AVG_DRAWDOWN_PCT: f64 = 15.0;
const NEUTRAL_AVG_DRAWDOWN_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketSentiment {
    Bearish,
    Neutral,
    Bullish,
}

/// Market-wide summary over one period of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub period: Period,
    pub total_assets_analyzed: usize,
    pub average_drawdown: f64,
    pub total_opportunities: usize,
    pub high_score_opportunities: usize,
    pub market_sentiment: MarketSentiment,
    pub last_updated: DateTime<Utc>,
}

impl MarketStats {
    pub fn compute(period: Period, generation: &GenerationMeta, entries: &[RankedAsset]) -> Self {
        let drawdowns: Vec<f64> = entries.iter().filter_map(|e| e.drawdown_pct).collect();
        let average = if drawdowns.is_empty() {
            0.0
        } else {
            drawdowns.iter().sum::<f64>() / drawdowns.len() as f64
        };

        let market_sentiment = if average > BEARISH_AVG_DRAWDOWN_PCT {
            MarketSentiment::Bearish
        } else if average > NEUTRAL_AVG_DRAWDOWN_PCT {
            MarketSentiment::Neutral
        } else {
            MarketSentiment::Bullish
        };

        Self {
            period,
            total_assets_analyzed: entries.len(),
            average_drawdown: (average * 100.0).round() / 100.0,
            total_opportunities: drawdowns.iter().filter(|d| **d > OPPORTUNITY_DRAWDOWN_PCT).count(),
            high_score_opportunities: entries.iter().filter(|e| e.scores.total > HIGH_SCORE_TOTAL).count(),
            market_sentiment,
            last_updated: generation.generated_at,
        }
    }
}
