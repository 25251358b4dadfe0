use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ddrscan_core::ingest::provider::HttpMarketDataProvider;
use ddrscan_core::refresh::{scheduler, RefreshOptions, RefreshOrchestrator};
use ddrscan_core::storage::memory::MemoryRankingStore;
use ddrscan_core::storage::rankings::PgRankingStore;
use ddrscan_core::storage::RankingStore;

mod routes;

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

    let store: Arc<dyn RankingStore> = match connect_db(&settings).await {
        Some(pool) => Arc::new(PgRankingStore::new(pool)),
        None => {
            tracing::warn!("rankings are kept in memory and will not survive a restart");
            Arc::new(MemoryRankingStore::new())
        }
    };

    let provider = Arc::new(HttpMarketDataProvider::from_settings(&settings)?);
    let options = RefreshOptions::from_env();
    let orchestrator = RefreshOrchestrator::new(provider, store.clone(), options.clone());

    match options.interval {
        Some(every) => {
            scheduler::spawn(orchestrator.clone(), every);
        }
        None => tracing::info!("scheduled refresh disabled; use POST /api/refresh"),
    }

    let app = routes::router(routes::AppState { orchestrator });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, store = store.backend_name(), universe_size = options.universe_size, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Falls back to `None` (in-memory degraded mode) on any database problem.
async fn connect_db(settings: &ddrscan_core::config::Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(db_url) => db_url,
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            return None;
        }
    };

    match ddrscan_core::storage::migrate(&pool).await {
        Ok(()) => Some(pool),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
