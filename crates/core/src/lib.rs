pub mod domain;
pub mod ingest;
pub mod refresh;
pub mod scoring;
pub mod storage;

pub mod config {
    use anyhow::Context;

    const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://pro-api.coinmarketcap.com";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL"),
                market_data_api_key: non_empty_var("MARKET_DATA_API_KEY"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn market_data_base_url(&self) -> &str {
            self.market_data_base_url
                .as_deref()
                .unwrap_or(DEFAULT_MARKET_DATA_BASE_URL)
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

}
