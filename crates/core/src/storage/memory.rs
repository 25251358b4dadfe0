use crate::domain::period::Period;
use crate::domain::ranking::{AssetScoreRecord, Generation, GenerationMeta, PeriodRanking};
use crate::storage::{RankingStore, WriterLease};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub attempted_at: DateTime<Utc>,
    pub error: String,
}

/// Process-local store. The current generation sits behind one pointer that
/// is replaced wholesale on commit.
#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    current: RwLock<Option<Arc<Generation>>>,
    last_failure: RwLock<Option<FailureRecord>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<Generation>> {
        self.current.read().await.clone()
    }

    pub async fn last_failure(&self) -> Option<FailureRecord> {
        self.last_failure.read().await.clone()
    }
}

#[async_trait::async_trait]
impl RankingStore for MemoryRankingStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn try_acquire_writer(&self) -> anyhow::Result<Option<WriterLease>> {
        Ok(Some(WriterLease::Local))
    }

    async fn commit_generation(&self, generation: &Generation) -> anyhow::Result<()> {
        let next = Arc::new(generation.clone());
        *self.current.write().await = Some(next);
        Ok(())
    }

    async fn record_failure(&self, attempted_at: DateTime<Utc>, error: &str) -> anyhow::Result<()> {
        *self.last_failure.write().await = Some(FailureRecord {
            attempted_at,
            error: error.to_string(),
        });
        Ok(())
    }

    async fn latest_generation(&self) -> anyhow::Result<Option<GenerationMeta>> {
        Ok(self.current().await.map(|g| g.meta))
    }

    async fn latest_ranking(
        &self,
        period: Period,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<PeriodRanking>> {
        let Some(generation) = self.current().await else {
            return Ok(None);
        };

        let entries = generation
            .ranking(period)
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(Some(PeriodRanking {
            period,
            generation: generation.meta,
            entries,
        }))
    }

    async fn latest_asset_score(
        &self,
        period: Period,
        symbol: &str,
    ) -> anyhow::Result<Option<AssetScoreRecord>> {
        let Some(generation) = self.current().await else {
            return Ok(None);
        };

        let symbol = symbol.trim();
        Ok(generation
            .ranking(period)
            .iter()
            .find(|e| e.symbol.eq_ignore_ascii_case(symbol))
            .map(|entry| AssetScoreRecord {
                period,
                generation: generation.meta,
                entry: entry.clone(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset::AssetSnapshot;
    use crate::scoring::ranking::build_generation;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn generation(at_hour: u32, symbols: &[(&str, f64)]) -> Generation {
        let assets: Vec<AssetSnapshot> = symbols
            .iter()
            .map(|(sym, pct)| AssetSnapshot {
                id: sym.to_ascii_lowercase(),
                symbol: sym.to_string(),
                name: sym.to_string(),
                price: 1.0,
                market_cap: 1.0e9,
                volume_24h: 1.0e6,
                changes: [(Period::Hours24, *pct)].into_iter().collect(),
            })
            .collect();
        let at = Utc.with_ymd_and_hms(2026, 10, 1, at_hour, 0, 0).unwrap();
        build_generation(Uuid::new_v4(), at, &assets)
    }

    #[tokio::test]
    async fn empty_store_reads_none() {
        let store = MemoryRankingStore::new();
        assert!(store.latest_generation().await.unwrap().is_none());
        assert!(store.latest_ranking(Period::Hours24, None).await.unwrap().is_none());
        assert!(store.latest_asset_score(Period::Hours24, "BTC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_limit_still_reports_the_generation() {
        let store = MemoryRankingStore::new();
        let committed = generation(3, &[("BTC", -10.0), ("ETH", -20.0)]);
        store.commit_generation(&committed).await.unwrap();

        let r = store.latest_ranking(Period::Hours24, Some(0)).await.unwrap().unwrap();
        assert_eq!(r.generation, committed.meta);
        assert!(r.entries.is_empty());
    }

    #[tokio::test]
    async fn commit_replaces_the_whole_generation() {
        let store = MemoryRankingStore::new();
        let first = generation(1, &[("BTC", -10.0), ("ETH", -20.0)]);
        let second = generation(2, &[("SOL", -5.0)]);

        store.commit_generation(&first).await.unwrap();
        let r = store.latest_ranking(Period::Hours24, None).await.unwrap().unwrap();
        assert_eq!(r.generation, first.meta);
        assert_eq!(r.entries.len(), 2);

        store.commit_generation(&second).await.unwrap();
        let r = store.latest_ranking(Period::Hours24, None).await.unwrap().unwrap();
        assert_eq!(r.generation, second.meta);
        assert_eq!(r.entries.len(), 1);
        assert!(store.latest_asset_score(Period::Hours24, "btc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn limit_truncates_in_rank_order_and_lookup_ignores_case() {
        let store = MemoryRankingStore::new();
        let g = generation(1, &[("AAA", -1.0), ("BBB", -25.0), ("CCC", -8.0)]);
        store.commit_generation(&g).await.unwrap();

        let r = store.latest_ranking(Period::Hours24, Some(2)).await.unwrap().unwrap();
        assert_eq!(r.entries.len(), 2);
        assert_eq!(r.entries[0].rank, 1);
        assert_eq!(r.entries[1].rank, 2);

        let rec = store.latest_asset_score(Period::Hours24, " bbb ").await.unwrap().unwrap();
        assert_eq!(rec.entry.symbol, "BBB");
        assert_eq!(rec.generation.id, g.meta.id);
    }

    #[tokio::test]
    async fn recorded_failure_does_not_touch_reads() {
        let store = MemoryRankingStore::new();
        let g = generation(1, &[("BTC", -10.0)]);
        store.commit_generation(&g).await.unwrap();
        let before = store.latest_ranking(Period::Hours24, None).await.unwrap();

        let at = Utc.with_ymd_and_hms(2026, 10, 1, 3, 0, 0).unwrap();
        store.record_failure(at, "upstream down").await.unwrap();

        assert_eq!(store.latest_ranking(Period::Hours24, None).await.unwrap(), before);
        assert_eq!(store.last_failure().await.unwrap().error, "upstream down");
    }
}
