use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ddrscan_core::domain::period::Period;
use ddrscan_core::ingest::provider::HttpMarketDataProvider;
use ddrscan_core::refresh::error::RefreshError;
use ddrscan_core::refresh::{RefreshOptions, RefreshOrchestrator};
use ddrscan_core::storage::memory::MemoryRankingStore;
use ddrscan_core::storage::rankings::PgRankingStore;

#[derive(Debug, Parser)]
#[command(name = "ddrscan_worker")]
struct Args {
    /// Top-N assets by market cap to fetch. Overrides UNIVERSE_SIZE.
    #[arg(long)]
    universe_size: Option<usize>,

    /// Fetch and score, log the leaders, skip the database.
    #[arg(long)]
    dry_run: bool,

    /// Period whose leaders are logged in dry-run mode.
    #[arg(long, default_value = "24h")]
    period: Period,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ddrscan_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let mut options = RefreshOptions::from_env();
    if let Some(n) = args.universe_size {
        options.universe_size = n;
    }
    let provider = Arc::new(HttpMarketDataProvider::from_settings(&settings)?);

    if args.dry_run {
        let orchestrator = RefreshOrchestrator::new(provider, Arc::new(MemoryRankingStore::new()), options);
        let generation = orchestrator.preview().await?;
        for entry in generation.ranking(args.period).iter().take(10) {
            tracing::info!(
                period = %args.period,
                rank = entry.rank,
                symbol = %entry.symbol,
                total = entry.scores.total,
                drawdown_pct = ?entry.drawdown_pct,
                "dry-run leader"
            );
        }
        tracing::info!(
            dry_run = true,
            assets = generation.meta.asset_count,
            "refresh preview complete"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    ddrscan_core::storage::migrate(&pool).await?;

    let orchestrator = RefreshOrchestrator::new(provider, Arc::new(PgRankingStore::new(pool)), options);

    match orchestrator.run_cycle().await {
        Ok(report) => {
            tracing::info!(
                generation_id = %report.generation.id,
                assets = report.generation.asset_count,
                elapsed_ms = report.elapsed.as_millis(),
                "persisted ranking generation"
            );
            Ok(())
        }
        Err(RefreshError::Busy) => {
            tracing::warn!("refresh lock not acquired; another run in progress");
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
    }
}

fn init_sentry(settings: &ddrscan_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
