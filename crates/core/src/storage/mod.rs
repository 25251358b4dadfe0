pub mod lock;
pub mod memory;
pub mod rankings;

use crate::domain::period::Period;
use crate::domain::ranking::{AssetScoreRecord, Generation, GenerationMeta, PeriodRanking};
use anyhow::Context;
use chrono::{DateTime, Utc};

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Persisted generations of ranked scores.
///
/// Readers only ever see complete generations: `commit_generation` makes a
/// whole generation visible at once or fails leaving the previous one in place.
#[async_trait::async_trait]
pub trait RankingStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Exclusive right to write, held for the duration of one refresh cycle.
    /// `None` means another writer holds it.
    async fn try_acquire_writer(&self) -> anyhow::Result<Option<WriterLease>>;

    async fn commit_generation(&self, generation: &Generation) -> anyhow::Result<()>;

    /// Records a failed cycle for diagnostics. Never affects reads.
    async fn record_failure(&self, attempted_at: DateTime<Utc>, error: &str) -> anyhow::Result<()>;

    async fn latest_generation(&self) -> anyhow::Result<Option<GenerationMeta>>;

    /// Entries of the latest generation for `period`, best rank first.
    ///
    /// `None` only when nothing has been committed; `Some(0)` as the limit
    /// yields the generation with no entries.
    async fn latest_ranking(
        &self,
        period: Period,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<PeriodRanking>>;

    /// Case-insensitive symbol lookup; the best-ranked match wins.
    async fn latest_asset_score(
        &self,
        period: Period,
        symbol: &str,
    ) -> anyhow::Result<Option<AssetScoreRecord>>;
}

#[derive(Debug)]
pub enum WriterLease {
    /// In-process stores rely on the orchestrator's own slot.
    Local,
    Postgres(lock::RefreshLock),
}

impl WriterLease {
    pub async fn release(self) {
        if let WriterLease::Postgres(lock) = self {
            if let Err(e) = lock.release().await {
                tracing::warn!(error = %e, "failed to release refresh lock");
            }
        }
    }
}
