use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use ddrscan_core::domain::period::{Period, PeriodSpec};
use ddrscan_core::refresh::state::RefreshStatus;
use ddrscan_core::refresh::{RefreshOrchestrator, TriggerOutcome};
use ddrscan_core::scoring::advice::{Opportunity, OpportunityFilter};
use ddrscan_core::scoring::stats::MarketStats;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: RefreshOrchestrator,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/periods", get(list_periods))
        .route("/api/rankings", get(get_rankings))
        .route("/api/assets/:symbol/score", get(get_asset_score))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/refresh/status", get(refresh_status))
        .route("/api/opportunities", post(find_opportunities))
        .route("/api/market/stats", get(market_stats))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ApiPeriods {
    periods: &'static [PeriodSpec],
}

async fn list_periods() -> Json<ApiPeriods> {
    Json(ApiPeriods {
        periods: Period::specs(),
    })
}

#[derive(Debug, Deserialize)]
struct RankingsQuery {
    period: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PeriodQuery {
    period: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiRanking {
    period: Period,
    period_label: &'static str,
    generation_id: Uuid,
    last_updated: DateTime<Utc>,
    total_assets: i32,
    rankings: Vec<Opportunity>,
}

async fn get_rankings(
    State(state): State<AppState>,
    Query(q): Query<RankingsQuery>,
) -> Result<Json<ApiRanking>, StatusCode> {
    let period = parse_period(q.period.as_deref())?;
    if q.limit == Some(0) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let ranking = state
        .orchestrator
        .store()
        .latest_ranking(period, q.limit)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiRanking {
        period,
        period_label: period.label(),
        generation_id: ranking.generation.id,
        last_updated: ranking.generation.generated_at,
        total_assets: ranking.generation.asset_count,
        rankings: ranking.entries.into_iter().map(Opportunity::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct ApiAssetScore {
    period: Period,
    generation_id: Uuid,
    last_updated: DateTime<Utc>,
    #[serde(flatten)]
    score: Opportunity,
}

async fn get_asset_score(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<ApiAssetScore>, StatusCode> {
    let period = parse_period(q.period.as_deref())?;

    let record = state
        .orchestrator
        .store()
        .latest_asset_score(period, &symbol)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiAssetScore {
        period,
        generation_id: record.generation.id,
        last_updated: record.generation.generated_at,
        score: Opportunity::from(record.entry),
    }))
}

#[derive(Debug, Serialize)]
struct RefreshAccepted {
    status: TriggerOutcome,
}

async fn trigger_refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshAccepted>) {
    let status = state.orchestrator.trigger();
    tracing::info!(?status, "refresh requested");
    (StatusCode::ACCEPTED, Json(RefreshAccepted { status }))
}

async fn refresh_status(State(state): State<AppState>) -> Json<RefreshStatus> {
    Json(state.orchestrator.status())
}

async fn find_opportunities(
    State(state): State<AppState>,
    Json(filter): Json<OpportunityFilter>,
) -> Result<Json<Vec<Opportunity>>, StatusCode> {
    let ranking = state
        .orchestrator
        .store()
        .latest_ranking(filter.period, None)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(filter.apply(ranking.entries)))
}

async fn market_stats(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<MarketStats>, StatusCode> {
    let period = parse_period(q.period.as_deref())?;

    let ranking = state
        .orchestrator
        .store()
        .latest_ranking(period, None)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(MarketStats::compute(
        period,
        &ranking.generation,
        &ranking.entries,
    )))
}

fn parse_period(raw: Option<&str>) -> Result<Period, StatusCode> {
    match raw {
        None => Ok(Period::DEFAULT),
        Some(s) => s.parse().map_err(|_| StatusCode::BAD_REQUEST),
    }
}

fn internal(err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "ranking store read failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ddrscan_core::domain::asset::AssetSnapshot;
    use ddrscan_core::ingest::provider::MarketSnapshotProvider;
    use ddrscan_core::refresh::RefreshOptions;
    use ddrscan_core::storage::memory::MemoryRankingStore;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixtureProvider;

    #[async_trait::async_trait]
    impl MarketSnapshotProvider for FixtureProvider {
        fn provider_name(&self) -> &'static str {
            "fixture"
        }

        async fn fetch_snapshot(&self, _universe_size: usize, _periods: &[Period]) -> anyhow::Result<Vec<AssetSnapshot>> {
            let coin = |symbol: &str, changes: &[(Period, f64)]| AssetSnapshot {
                id: symbol.to_ascii_lowercase(),
                symbol: symbol.to_string(),
                name: format!("{symbol} Coin"),
                price: 10.0,
                market_cap: 5.0e9,
                volume_24h: 2.0e8,
                changes: changes.iter().copied().collect(),
            };
            Ok(vec![
                coin("BTC", &[(Period::Hour1, 0.1), (Period::Hours24, -2.0), (Period::Days30, -8.0)]),
                coin("ETH", &[(Period::Hour1, 1.5), (Period::Hours24, -25.0), (Period::Days30, -40.0)]),
                coin("NEW", &[(Period::Hour1, 0.4), (Period::Hours24, -12.0)]),
            ])
        }
    }

    fn state() -> AppState {
        let store = Arc::new(MemoryRankingStore::new());
        AppState {
            orchestrator: RefreshOrchestrator::new(Arc::new(FixtureProvider), store, RefreshOptions::default()),
        }
    }

    async fn seeded() -> AppState {
        let state = state();
        state.orchestrator.run_cycle().await.unwrap();
        state
    }

    async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let res = router(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn periods_lists_the_static_table() {
        let (status, body) = call(&state(), get("/api/periods")).await;
        assert_eq!(status, StatusCode::OK);
        let periods = body["periods"].as_array().unwrap();
        assert_eq!(periods.len(), Period::ALL.len());
        assert_eq!(periods[1]["id"], "24h");
        assert_eq!(periods[1]["label"], "24 Hours");
    }

    #[tokio::test]
    async fn rankings_before_first_refresh_is_not_found() {
        let (status, _) = call(&state(), get("/api/rankings?period=24h")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rankings_are_ordered_limited_and_consistent() {
        let state = seeded().await;
        let (status, body) = call(&state, get("/api/rankings?period=24h&limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period"], "24h");
        assert_eq!(body["total_assets"], 3);

        let rows = body["rankings"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["rank"], 1);
        assert_eq!(rows[1]["rank"], 2);
        for row in rows {
            let total = row["total_score"].as_f64().unwrap();
            let expected = 0.25 * row["performance_score"].as_f64().unwrap()
                + 0.20 * row["drawdown_score"].as_f64().unwrap()
                + 0.35 * row["rebound_potential_score"].as_f64().unwrap()
                + 0.20 * row["momentum_score"].as_f64().unwrap();
            assert!((total - expected).abs() < 1e-6);
            assert!(row["risk_level"].is_string());
            assert!(row["recommended_action"].is_string());
        }
    }

    #[tokio::test]
    async fn ranking_includes_assets_missing_the_period() {
        let state = seeded().await;
        let (status, body) = call(&state, get("/api/rankings?period=30d")).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["rankings"].as_array().unwrap();
        let new = rows.iter().find(|r| r["symbol"] == "NEW").unwrap();
        let total = new["total_score"].as_f64().unwrap();
        assert!((total - ddrscan_core::scoring::MISSING_DATA_TOTAL).abs() < 1e-9);
        assert_eq!(rows.last().unwrap()["symbol"], "NEW");
        assert!(new["change_pct"].is_null());
    }

    #[tokio::test]
    async fn unknown_period_is_bad_request() {
        let state = seeded().await;
        let (status, _) = call(&state, get("/api/rankings?period=2w")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn zero_limit_is_bad_request() {
        let state = seeded().await;
        let (status, _) = call(&state, get("/api/rankings?period=24h&limit=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, get("/api/rankings?period=24h&limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rankings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn asset_score_lookup_is_case_insensitive() {
        let state = seeded().await;
        let (status, body) = call(&state, get("/api/assets/eth/score?period=24h")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "ETH");
        assert_eq!(body["period"], "24h");

        let (status, _) = call(&state, get("/api/assets/DOGE/score")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_is_accepted_asynchronously() {
        let state = state();
        let req = Request::builder()
            .method("POST")
            .uri("/api/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "started");

        for _ in 0..200 {
            if state.orchestrator.status().completed_cycles == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let (status, body) = call(&state, get("/api/refresh/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed_cycles"], 1);
        assert_eq!(body["phase"], "IDLE");
    }

    #[tokio::test]
    async fn opportunities_and_stats_use_latest_generation() {
        let state = seeded().await;
        let req = Request::builder()
            .method("POST")
            .uri("/api/opportunities")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"period":"24h","min_drawdown":5}"#))
            .unwrap();
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        let symbols: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["symbol"].as_str().unwrap())
            .collect();
        assert!(symbols.contains(&"ETH"));
        assert!(!symbols.contains(&"BTC"));

        let (status, body) = call(&state, get("/api/market/stats?period=24h")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_assets_analyzed"], 3);
        assert!(body["last_updated"].is_string());
    }
}
