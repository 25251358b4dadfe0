use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Static description of one supported lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub lookback_hours: u32,
}

/// Supported lookback windows, shortest first. Scoring walks this table by
/// position, so the order matters.
static PERIOD_TABLE: [PeriodSpec; 9] = [
    PeriodSpec { id: "1h", label: "1 Hour", lookback_hours: 1 },
    PeriodSpec { id: "24h", label: "24 Hours", lookback_hours: 24 },
    PeriodSpec { id: "7d", label: "7 Days", lookback_hours: 7 * 24 },
    PeriodSpec { id: "30d", label: "1 Month", lookback_hours: 30 * 24 },
    PeriodSpec { id: "60d", label: "2 Months", lookback_hours: 60 * 24 },
    PeriodSpec { id: "90d", label: "3 Months", lookback_hours: 90 * 24 },
    PeriodSpec { id: "180d", label: "6 Months", lookback_hours: 180 * 24 },
    PeriodSpec { id: "270d", label: "9 Months", lookback_hours: 270 * 24 },
    PeriodSpec { id: "1y", label: "1 Year", lookback_hours: 365 * 24 },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "60d")]
    Days60,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "180d")]
    Days180,
    #[serde(rename = "270d")]
    Days270,
    #[serde(rename = "1y")]
    Year1,
}

impl Period {
    pub const ALL: [Period; 9] = [
        Period::Hour1,
        Period::Hours24,
        Period::Days7,
        Period::Days30,
        Period::Days60,
        Period::Days90,
        Period::Days180,
        Period::Days270,
        Period::Year1,
    ];

    pub const DEFAULT: Period = Period::Hours24;

    fn index(self) -> usize {
        self as usize
    }

    pub fn spec(self) -> &'static PeriodSpec {
        &PERIOD_TABLE[self.index()]
    }

    pub fn id(self) -> &'static str {
        self.spec().id
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn lookback_hours(self) -> u32 {
        self.spec().lookback_hours
    }

    pub fn specs() -> &'static [PeriodSpec] {
        &PERIOD_TABLE
    }

    /// Windows no longer than this one, shortest first (includes `self`).
    pub fn within(self) -> impl Iterator<Item = Period> {
        let lookback = self.lookback_hours();
        Period::ALL
            .into_iter()
            .filter(move |p| p.lookback_hours() <= lookback)
    }

    /// (short, long) pair compared by the momentum score.
    ///
    /// The long side is the period itself and the short side its shorter
    /// neighbour; the shortest window borrows the next one up as its long side.
    pub fn momentum_pair(self) -> (Period, Period) {
        let idx = self.index();
        if idx == 0 {
            (Period::ALL[0], Period::ALL[1])
        } else {
            (Period::ALL[idx - 1], self)
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Period::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unsupported period: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_by_lookback_and_matches_enum_order() {
        for (i, p) in Period::ALL.iter().enumerate() {
            assert_eq!(p.spec(), &PERIOD_TABLE[i]);
        }
        for w in PERIOD_TABLE.windows(2) {
            assert!(w[0].lookback_hours < w[1].lookback_hours);
        }
    }

    #[test]
    fn parses_ids_case_insensitively() {
        assert_eq!("24h".parse::<Period>().unwrap(), Period::Hours24);
        assert_eq!(" 1Y ".parse::<Period>().unwrap(), Period::Year1);
        assert!("2w".parse::<Period>().is_err());
    }

    #[test]
    fn serde_uses_period_ids() {
        let v = serde_json::to_value(Period::Days30).unwrap();
        assert_eq!(v, serde_json::json!("30d"));
        let p: Period = serde_json::from_value(serde_json::json!("180d")).unwrap();
        assert_eq!(p, Period::Days180);
    }

    #[test]
    fn momentum_pairs_step_down_one_window() {
        assert_eq!(Period::Hour1.momentum_pair(), (Period::Hour1, Period::Hours24));
        assert_eq!(Period::Days7.momentum_pair(), (Period::Hours24, Period::Days7));
        assert_eq!(Period::Year1.momentum_pair(), (Period::Days270, Period::Year1));
    }

    #[test]
    fn within_includes_self_and_shorter_windows() {
        let got: Vec<_> = Period::Days7.within().collect();
        assert_eq!(got, vec![Period::Hour1, Period::Hours24, Period::Days7]);
    }
}
