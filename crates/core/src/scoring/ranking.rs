use crate::domain::asset::AssetSnapshot;
use crate::domain::period::Period;
use crate::domain::ranking::{Generation, GenerationMeta, RankedAsset};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Scores every asset for `period` and assigns 1-based ranks by total score.
///
/// The sort is stable, so equal totals keep the input order.
pub fn rank_period(assets: &[AssetSnapshot], period: Period) -> Vec<RankedAsset> {
    let mut scored: Vec<RankedAsset> = assets
        .iter()
        .map(|asset| RankedAsset {
            rank: 0,
            asset_id: asset.id.clone(),
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            price: asset.price,
            market_cap: asset.market_cap,
            volume_24h: asset.volume_24h,
            change_pct: asset.change(period),
            drawdown_pct: super::drawdown_pct(asset, period),
            scores: super::score(asset, period),
        })
        .collect();

    scored.sort_by(|a, b| b.scores.total.total_cmp(&a.scores.total));

    for (idx, entry) in scored.iter_mut().enumerate() {
        entry.rank = (idx + 1) as i32;
    }
    scored
}

/// Builds a complete generation: every asset ranked for every period.
pub fn build_generation(
    id: Uuid,
    generated_at: DateTime<Utc>,
    assets: &[AssetSnapshot],
) -> Generation {
    let rankings: BTreeMap<Period, Vec<RankedAsset>> = Period::ALL
        .into_iter()
        .map(|period| (period, rank_period(assets, period)))
        .collect();

    Generation {
        meta: GenerationMeta {
            id,
            generated_at,
            asset_count: assets.len() as i32,
        },
        rankings,
    }
}
