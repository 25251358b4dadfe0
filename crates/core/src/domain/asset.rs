use crate::domain::period::Period;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One asset as seen by a single fetch cycle.
///
/// `changes` may be partial: newly listed assets (or provider gaps) simply have
/// no entry for some periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub changes: BTreeMap<Period, f64>,
}

impl AssetSnapshot {
    /// Percentage change for `period`; non-finite values count as missing.
    pub fn change(&self, period: Period) -> Option<f64> {
        self.changes.get(&period).copied().filter(|v| !v.is_nan())
    }
}
