use crate::config::Settings;
use crate::domain::asset::AssetSnapshot;
use crate::domain::period::Period;
use crate::ingest::types::{ListingItem, ListingsResponse};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/cryptocurrency/listings/latest";
const DEFAULT_RETRIES: u32 = 3;
const QUOTE_CURRENCY: &str = "USD";
const API_KEY_HEADER: &str = "x-cmc_pro_api_key";
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Source of per-cycle market snapshots.
///
/// Implementations either return the whole universe or fail; a partial
/// universe is never returned. Missing per-period changes are not failures.
#[async_trait::async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_snapshot(&self, universe_size: usize, periods: &[Period]) -> Result<Vec<AssetSnapshot>>;
}

#[derive(Debug, Clone)]
pub struct HttpMarketDataProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpMarketDataProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.market_data_base_url().to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let path = std::env::var("MARKET_DATA_LISTINGS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.api_key {
            headers.insert(API_KEY_HEADER, HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, universe_size: usize) -> Result<ListingsResponse> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[
                ("start", "1".to_string()),
                ("limit", universe_size.to_string()),
                ("convert", QUOTE_CURRENCY.to_string()),
            ])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("market data response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<ListingsResponse>(raw_json)
            .context("failed to parse market data response into ListingsResponse")
    }
}

#[async_trait::async_trait]
impl MarketSnapshotProvider for HttpMarketDataProvider {
    fn provider_name(&self) -> &'static str {
        "http_listings"
    }

    async fn fetch_snapshot(&self, universe_size: usize, periods: &[Period]) -> Result<Vec<AssetSnapshot>> {
        anyhow::ensure!(
            (1..=5000).contains(&universe_size),
            "universe size must be 1..=5000 (got {universe_size})"
        );

        let mut attempt: u32 = 0;
        let parsed = loop {
            attempt += 1;
            match self.fetch_once(universe_size).await {
                Ok(parsed) => break parsed,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        into_snapshots(parsed, periods)
    }
}

/// Delay before retrying after the given 1-based failed attempt: 1s, 2s, 4s,
/// capped at 64s.
fn retry_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(1u64 << exponent)
}

/// Validates a listings payload and converts it into snapshots.
///
/// Any malformed item fails the whole payload.
pub fn into_snapshots(resp: ListingsResponse, periods: &[Period]) -> Result<Vec<AssetSnapshot>> {
    anyhow::ensure!(!resp.data.is_empty(), "market data returned no assets");

    let mut out = Vec::with_capacity(resp.data.len());
    for (idx, item) in resp.data.into_iter().enumerate() {
        let snapshot = into_snapshot(item, periods).with_context(|| format!("malformed listing at index {idx}"))?;
        out.push(snapshot);
    }
    Ok(out)
}

fn into_snapshot(item: ListingItem, periods: &[Period]) -> Result<AssetSnapshot> {
    let id = match &item.id {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => anyhow::bail!("id must be a string or number (got {other})"),
    };
    anyhow::ensure!(!id.is_empty(), "id must be non-empty");

    let symbol = item.symbol.trim().to_ascii_uppercase();
    anyhow::ensure!(!symbol.is_empty(), "symbol must be non-empty");

    let name = item.name.trim().to_string();
    anyhow::ensure!(!name.is_empty(), "name must be non-empty");

    let quote = item
        .quote
        .get(QUOTE_CURRENCY)
        .with_context(|| format!("{symbol}: missing {QUOTE_CURRENCY} quote"))?;

    let price = quote.price.with_context(|| format!("{symbol}: price is missing"))?;
    anyhow::ensure!(price.is_finite(), "{symbol}: price must be finite (got {price})");

    let mut changes = BTreeMap::new();
    for period in periods {
        if let Some(pct) = quote.percent_change(period.id()).filter(|v| v.is_finite()) {
            changes.insert(*period, pct);
        }
    }

    Ok(AssetSnapshot {
        id,
        symbol,
        name,
        price,
        market_cap: quote.market_cap.unwrap_or(0.0),
        volume_24h: quote.volume_24h.unwrap_or(0.0),
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(1));
        assert_eq!(retry_backoff(2), Duration::from_secs(2));
        assert_eq!(retry_backoff(3), Duration::from_secs(4));
        assert_eq!(retry_backoff(7), Duration::from_secs(64));
        assert_eq!(retry_backoff(65), Duration::from_secs(64));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(64));
    }

    fn listing(symbol: &str, quote: Value) -> Value {
        json!({
            "id": 1,
            "slug": symbol.to_ascii_lowercase(),
            "symbol": symbol,
            "name": format!("{symbol} Coin"),
            "quote": { "USD": quote },
        })
    }

    #[test]
    fn parses_listings_and_keeps_partial_period_data() {
        let v = json!({
            "data": [
                listing("btc", json!({
                    "price": 64000.5,
                    "market_cap": 1.2e12,
                    "volume_24h": 3.1e10,
                    "percent_change_1h": 0.2,
                    "percent_change_24h": -3.5,
                    "percent_change_7d": null,
                    "percent_change_30d": 12.0,
                })),
            ]
        });
        let parsed: ListingsResponse = serde_json::from_value(v).unwrap();
        let snaps = into_snapshots(parsed, &Period::ALL).unwrap();

        assert_eq!(snaps.len(), 1);
        let btc = &snaps[0];
        assert_eq!(btc.symbol, "BTC");
        assert_eq!(btc.id, "1");
        assert_eq!(btc.change(Period::Hours24), Some(-3.5));
        assert_eq!(btc.change(Period::Days7), None);
        assert_eq!(btc.change(Period::Year1), None);
        assert_eq!(btc.changes.len(), 3);
    }

    #[test]
    fn long_periods_are_read_when_the_provider_supplies_them() {
        let cmc_shape = json!({
            "price": 2.0,
            "percent_change_60d": -20.0,
            "percent_change_90d": -30.0,
        });
        let extended = json!({
            "price": 2.0,
            "percent_change_180d": -45.0,
            "percent_change_270d": -50.0,
            "percent_change_1y": -60.0,
        });
        let v = json!({ "data": [listing("CMC", cmc_shape), listing("EXT", extended)] });
        let parsed: ListingsResponse = serde_json::from_value(v).unwrap();
        let snaps = into_snapshots(parsed, &Period::ALL).unwrap();

        assert_eq!(snaps[0].change(Period::Days90), Some(-30.0));
        assert_eq!(snaps[0].change(Period::Days180), None);
        assert_eq!(snaps[0].change(Period::Year1), None);
        assert_eq!(snaps[1].change(Period::Days180), Some(-45.0));
        assert_eq!(snaps[1].change(Period::Days270), Some(-50.0));
        assert_eq!(snaps[1].change(Period::Year1), Some(-60.0));
    }

    #[test]
    fn null_market_cap_defaults_to_zero() {
        let v = json!({ "data": [listing("NEW", json!({"price": 0.0, "market_cap": null}))] });
        let parsed: ListingsResponse = serde_json::from_value(v).unwrap();
        let snaps = into_snapshots(parsed, &Period::ALL).unwrap();
        assert_eq!(snaps[0].market_cap, 0.0);
        assert_eq!(snaps[0].volume_24h, 0.0);
        assert!(snaps[0].changes.is_empty());
    }

    #[test]
    fn rejects_whole_payload_when_one_item_is_malformed() {
        let v = json!({
            "data": [
                listing("BTC", json!({"price": 1.0})),
                listing("ETH", json!({"price": null})),
            ]
        });
        let parsed: ListingsResponse = serde_json::from_value(v).unwrap();
        assert!(into_snapshots(parsed, &Period::ALL).is_err());
    }

    #[test]
    fn rejects_empty_universe_and_missing_quote() {
        let parsed: ListingsResponse = serde_json::from_value(json!({"data": []})).unwrap();
        assert!(into_snapshots(parsed, &Period::ALL).is_err());

        let v = json!({"data": [{"id": "x", "symbol": "X", "name": "X", "quote": {"EUR": {"price": 1.0}}}]});
        let parsed: ListingsResponse = serde_json::from_value(v).unwrap();
        assert!(into_snapshots(parsed, &Period::ALL).is_err());
    }
}
