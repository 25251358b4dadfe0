use crate::domain::period::Period;
use crate::domain::ranking::{
    AssetScoreRecord, Generation, GenerationMeta, PeriodRanking, RankedAsset, ScoreComponents,
};
use crate::storage::{lock, RankingStore, WriterLease};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// 16 binds per row keeps a batch well under the Postgres bind limit.
const ENTRY_INSERT_BATCH: usize = 500;

// Every read resolves the latest successful generation and its entries in one
// statement, so a concurrent commit can never produce a mixed result.
const LATEST_CTE: &str = "WITH latest AS ( \
     SELECT id, generated_at, asset_count FROM ranking_generations \
     WHERE status = 'success' \
     ORDER BY generated_at DESC, id DESC \
     LIMIT 1 \
 ) ";

const ENTRY_COLUMNS: &str = "latest.id AS generation_id, latest.generated_at, latest.asset_count, \
     e.rank, e.asset_id, e.symbol, e.name, e.price, e.market_cap, e.volume_24h, \
     e.change_pct, e.drawdown_pct, e.performance_score, e.drawdown_score, \
     e.rebound_potential_score, e.momentum_score, e.total_score";

#[derive(Debug, Clone)]
pub struct PgRankingStore {
    pool: sqlx::PgPool,
}

impl PgRankingStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    generation_id: Uuid,
    generated_at: DateTime<Utc>,
    asset_count: i32,
    rank: i32,
    asset_id: String,
    symbol: String,
    name: String,
    price: f64,
    market_cap: f64,
    volume_24h: f64,
    change_pct: Option<f64>,
    drawdown_pct: Option<f64>,
    performance_score: f64,
    drawdown_score: f64,
    rebound_potential_score: f64,
    momentum_score: f64,
    total_score: f64,
}

impl EntryRow {
    fn meta(&self) -> GenerationMeta {
        GenerationMeta {
            id: self.generation_id,
            generated_at: self.generated_at,
            asset_count: self.asset_count,
        }
    }

    fn into_entry(self) -> RankedAsset {
        RankedAsset {
            rank: self.rank,
            asset_id: self.asset_id,
            symbol: self.symbol,
            name: self.name,
            price: self.price,
            market_cap: self.market_cap,
            volume_24h: self.volume_24h,
            change_pct: self.change_pct,
            drawdown_pct: self.drawdown_pct,
            scores: ScoreComponents {
                performance: self.performance_score,
                drawdown: self.drawdown_score,
                rebound_potential: self.rebound_potential_score,
                momentum: self.momentum_score,
                total: self.total_score,
            },
        }
    }
}

#[async_trait::async_trait]
impl RankingStore for PgRankingStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn try_acquire_writer(&self) -> anyhow::Result<Option<WriterLease>> {
        Ok(lock::try_acquire_refresh_lock(&self.pool)
            .await?
            .map(WriterLease::Postgres))
    }

    async fn commit_generation(&self, generation: &Generation) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        sqlx::query(
            "INSERT INTO ranking_generations (id, generated_at, status, asset_count, error) \
             VALUES ($1, $2, 'success', $3, NULL)",
        )
        .persistent(false)
        .bind(generation.meta.id)
        .bind(generation.meta.generated_at)
        .bind(generation.meta.asset_count)
        .execute(&mut *tx)
        .await
        .context("insert ranking_generations failed")?;

        let rows: Vec<(Period, &RankedAsset)> = generation
            .rankings
            .iter()
            .flat_map(|(period, entries)| entries.iter().map(move |e| (*period, e)))
            .collect();

        for (batch_idx, chunk) in rows.chunks(ENTRY_INSERT_BATCH).enumerate() {
            let t0 = std::time::Instant::now();
            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO ranking_entries (generation_id, period, rank, asset_id, symbol, name, \
                 price, market_cap, volume_24h, change_pct, drawdown_pct, performance_score, \
                 drawdown_score, rebound_potential_score, momentum_score, total_score) ",
            );
            qb.push_values(chunk, |mut b, (period, e)| {
                b.push_bind(generation.meta.id)
                    .push_bind(period.id())
                    .push_bind(e.rank)
                    .push_bind(&e.asset_id)
                    .push_bind(&e.symbol)
                    .push_bind(&e.name)
                    .push_bind(e.price)
                    .push_bind(e.market_cap)
                    .push_bind(e.volume_24h)
                    .push_bind(e.change_pct)
                    .push_bind(e.drawdown_pct)
                    .push_bind(e.scores.performance)
                    .push_bind(e.scores.drawdown)
                    .push_bind(e.scores.rebound_potential)
                    .push_bind(e.scores.momentum)
                    .push_bind(e.scores.total);
            });

            qb.build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context("batch insert ranking_entries failed")?;

            tracing::debug!(
                generation_id = %generation.meta.id,
                batch_idx,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "ranking_entries batch insert"
            );
        }

        tx.commit().await.context("commit transaction failed")?;
        Ok(())
    }

    async fn record_failure(&self, attempted_at: DateTime<Utc>, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO ranking_generations (id, generated_at, status, asset_count, error) \
             VALUES ($1, $2, 'error', 0, $3)",
        )
        .persistent(false)
        .bind(Uuid::new_v4())
        .bind(attempted_at)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("insert error ranking_generations failed")?;
        Ok(())
    }

    async fn latest_generation(&self) -> anyhow::Result<Option<GenerationMeta>> {
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, i32)>(
            "SELECT id, generated_at, asset_count FROM ranking_generations \
             WHERE status = 'success' \
             ORDER BY generated_at DESC, id DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("select latest ranking_generations failed")?;

        Ok(row.map(|(id, generated_at, asset_count)| GenerationMeta {
            id,
            generated_at,
            asset_count,
        }))
    }

    async fn latest_ranking(
        &self,
        period: Period,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<PeriodRanking>> {
        if limit == Some(0) {
            // LIMIT 0 returns no rows even when a generation exists.
            return Ok(self.latest_generation().await?.map(|generation| PeriodRanking {
                period,
                generation,
                entries: Vec::new(),
            }));
        }

        let sql = format!(
            "{LATEST_CTE} SELECT {ENTRY_COLUMNS} \
             FROM latest JOIN ranking_entries e ON e.generation_id = latest.id \
             WHERE e.period = $1 \
             ORDER BY e.rank ASC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(period.id())
            .bind(limit.map(|n| n.min(i64::MAX as usize) as i64))
            .fetch_all(&self.pool)
            .await
            .context("select latest ranking_entries failed")?;

        let Some(first) = rows.first() else {
            // A committed generation always ranks every period, so an empty
            // result means nothing has been committed yet.
            return Ok(None);
        };
        let generation = first.meta();

        Ok(Some(PeriodRanking {
            period,
            generation,
            entries: rows.into_iter().map(EntryRow::into_entry).collect(),
        }))
    }

    async fn latest_asset_score(
        &self,
        period: Period,
        symbol: &str,
    ) -> anyhow::Result<Option<AssetScoreRecord>> {
        let sql = format!(
            "{LATEST_CTE} SELECT {ENTRY_COLUMNS} \
             FROM latest JOIN ranking_entries e ON e.generation_id = latest.id \
             WHERE e.period = $1 AND upper(e.symbol) = upper($2) \
             ORDER BY e.rank ASC \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(period.id())
            .bind(symbol.trim())
            .fetch_optional(&self.pool)
            .await
            .context("select ranking_entries by symbol failed")?;

        Ok(row.map(|row| AssetScoreRecord {
            period,
            generation: row.meta(),
            entry: row.into_entry(),
        }))
    }
}
