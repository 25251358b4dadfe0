use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Listings payload as returned by the upstream market-data API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingsResponse {
    pub data: Vec<ListingItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingItem {
    pub id: Value,
    #[serde(default)]
    pub slug: Option<String>,
    pub symbol: String,
    pub name: String,
    pub quote: BTreeMap<String, ListingQuote>,
}

/// One quote currency. `percent_change_<period>` fields are optional and kept
/// in `extra` so any supported period can be looked up by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingQuote {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ListingQuote {
    pub fn percent_change(&self, period_id: &str) -> Option<f64> {
        self.extra
            .get(&format!("percent_change_{period_id}"))
            .and_then(Value::as_f64)
    }
}
