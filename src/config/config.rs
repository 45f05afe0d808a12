use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::db::models::Chain;
use crate::error::IndexerError;
use crate::utils::RetryPolicy;

/// PostgreSQL database connection configuration.
///
/// Stores price snapshots, pool snapshots, market data and job heartbeats.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Upstream data providers: credentials and endpoints.
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesSettings {
    pub coinmarketcap_api_key: String,
    pub the_graph_api_key: String,
    pub moralis_api_key: String,
    #[serde(default = "default_coinmarketcap_url")]
    pub coinmarketcap_url: String,
    /// CoinMarketCap id of the tracked token.
    #[serde(default = "default_market_token_id")]
    pub market_token_id: u64,
    #[serde(default = "default_the_graph_gateway_url")]
    pub the_graph_gateway_url: String,
    #[serde(default = "default_ethereum_subgraph_id")]
    pub ethereum_subgraph_id: String,
    #[serde(default = "default_base_subgraph_id")]
    pub base_subgraph_id: String,
    #[serde(default = "default_moralis_evm_url")]
    pub moralis_evm_url: String,
    #[serde(default = "default_moralis_solana_url")]
    pub moralis_solana_url: String,
    #[serde(default = "default_orca_url")]
    pub orca_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_coinmarketcap_url() -> String {
    "https://pro-api.coinmarketcap.com".to_string()
}

fn default_market_token_id() -> u64 {
    11823
}

fn default_the_graph_gateway_url() -> String {
    "https://gateway.thegraph.com/api/subgraphs/id".to_string()
}

fn default_ethereum_subgraph_id() -> String {
    "EYCKATKGBKLWvSfwvBjzfCBmGwYNdVkduYXVivCsLRFu".to_string()
}

fn default_base_subgraph_id() -> String {
    "GENunSHWLBXm59mBSgPzQ8metBEp9YDfdqwFr91Av1UM".to_string()
}

fn default_moralis_evm_url() -> String {
    "https://deep-index.moralis.io/api/v2.2".to_string()
}

fn default_moralis_solana_url() -> String {
    "https://solana-gateway.moralis.io".to_string()
}

fn default_orca_url() -> String {
    "https://api.orca.so/v2/solana".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl SourcesSettings {
    pub fn subgraph_url(&self, chain: Chain) -> Option<String> {
        let id = match chain {
            Chain::Ethereum => &self.ethereum_subgraph_id,
            Chain::Base => &self.base_subgraph_id,
            Chain::Solana => return None,
        };
        Some(format!(
            "{}/{}",
            self.the_graph_gateway_url.trim_end_matches('/'),
            id
        ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// RPC endpoints, one per chain.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub ethereum_rpc_url: String,
    pub base_rpc_url: String,
    pub solana_rpc_url: String,
}

impl ChainSettings {
    pub fn rpc_url(&self, chain: Chain) -> &str {
        match chain {
            Chain::Base => &self.base_rpc_url,
            Chain::Ethereum => &self.ethereum_rpc_url,
            Chain::Solana => &self.solana_rpc_url,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_factor,
        )
    }
}

/// Indexing run behaviour.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_dedup_epsilon")]
    pub dedup_epsilon: f64,
    /// Minimum age of the latest pool snapshot before pools are fetched again.
    #[serde(default = "default_pool_refresh_secs")]
    pub pool_refresh_secs: u64,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    /// Seeds used when no market data has been stored yet.
    #[serde(default)]
    pub initial_all_time_high: Option<f64>,
    #[serde(default)]
    pub initial_all_time_low: Option<f64>,
}

fn default_interval_secs() -> u64 {
    900
}

fn default_dedup_epsilon() -> f64 {
    1e-6
}

fn default_pool_refresh_secs() -> u64 {
    3600
}

fn default_token_decimals() -> u8 {
    6
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry: RetrySettings::default(),
            dedup_epsilon: default_dedup_epsilon(),
            pool_refresh_secs: default_pool_refresh_secs(),
            token_decimals: default_token_decimals(),
            initial_all_time_high: None,
            initial_all_time_low: None,
        }
    }
}

impl IndexerSettings {
    /// `pool_refresh_secs` in ms, `None` when it does not fit an `i64`.
    pub fn pool_refresh_ms(&self) -> Option<i64> {
        i64::try_from(self.pool_refresh_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionSettings {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_retention_interval_secs")]
    pub interval_secs: u64,
}

fn default_horizon_days() -> u32 {
    30
}

fn default_retention_interval_secs() -> u64 {
    86_400
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            interval_secs: default_retention_interval_secs(),
        }
    }
}

/// Read side: caching, default windows and health thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_price_limit")]
    pub default_price_limit: u32,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,
    #[serde(default = "default_market_window_hours")]
    pub market_window_hours: u32,
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_price_limit() -> u32 {
    192
}

fn default_stale_after_secs() -> u64 {
    1_200
}

fn default_alert_cooldown_secs() -> u64 {
    3_600
}

fn default_market_window_hours() -> u32 {
    24
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            default_price_limit: default_price_limit(),
            stale_after_secs: default_stale_after_secs(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            market_window_hours: default_market_window_hours(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `POOLWATCH__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub sources: SourcesSettings,
    pub chains: ChainSettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub api: ApiSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(
                Environment::with_prefix("POOLWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        let required = [
            ("sources.coinmarketcap_api_key", &self.sources.coinmarketcap_api_key),
            ("sources.the_graph_api_key", &self.sources.the_graph_api_key),
            ("sources.moralis_api_key", &self.sources.moralis_api_key),
            ("chains.ethereum_rpc_url", &self.chains.ethereum_rpc_url),
            ("chains.base_rpc_url", &self.chains.base_rpc_url),
            ("chains.solana_rpc_url", &self.chains.solana_rpc_url),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(IndexerError::Config(format!("{} is required", name)));
            }
        }

        if self.indexer.retry.max_attempts == 0 {
            return Err(IndexerError::Config(
                "indexer.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.indexer.dedup_epsilon.is_finite() || self.indexer.dedup_epsilon < 0.0 {
            return Err(IndexerError::Config(
                "indexer.dedup_epsilon must be a non-negative number".to_string(),
            ));
        }
        if self.indexer.interval_secs == 0 || self.retention.interval_secs == 0 {
            return Err(IndexerError::Config(
                "job intervals must be greater than zero".to_string(),
            ));
        }
        if self.indexer.pool_refresh_ms().is_none() {
            return Err(IndexerError::Config(format!(
                "indexer.pool_refresh_secs is out of range: {}",
                self.indexer.pool_refresh_secs
            )));
        }
        if self.api.default_price_limit == 0 {
            return Err(IndexerError::Config(
                "api.default_price_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            postgres: PostgresSettings {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                database: "poolwatch".to_string(),
                pool_size: default_pool_size(),
            },
            sources: serde_json::from_value(serde_json::json!({
                "coinmarketcap_api_key": "cmc",
                "the_graph_api_key": "graph",
                "moralis_api_key": "moralis",
            }))
            .unwrap(),
            chains: ChainSettings {
                ethereum_rpc_url: "http://eth".to_string(),
                base_rpc_url: "http://base".to_string(),
                solana_rpc_url: "http://sol".to_string(),
            },
            indexer: IndexerSettings::default(),
            retention: RetentionSettings::default(),
            api: ApiSettings::default(),
        }
    }

    #[test]
    fn test_defaults() {
        let settings = settings();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.indexer.interval_secs, 900);
        assert_eq!(settings.indexer.pool_refresh_secs, 3600);
        assert_eq!(settings.api.default_price_limit, 192);
        assert_eq!(settings.sources.market_token_id, 11823);
        assert_eq!(
            settings.indexer.retry.policy(),
            RetryPolicy::new(3, Duration::from_millis(500), 2.0)
        );
    }

    #[test]
    fn test_subgraph_url() {
        let sources = settings().sources;
        assert_eq!(
            sources.subgraph_url(Chain::Ethereum).unwrap(),
            "https://gateway.thegraph.com/api/subgraphs/id/EYCKATKGBKLWvSfwvBjzfCBmGwYNdVkduYXVivCsLRFu"
        );
        assert!(sources.subgraph_url(Chain::Solana).is_none());
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let mut settings = settings();
        settings.sources.moralis_api_key = " ".to_string();
        assert!(matches!(settings.validate(), Err(IndexerError::Config(_))));
    }

    #[test]
    fn test_oversized_pool_refresh_is_fatal() {
        let mut settings = settings();
        settings.indexer.pool_refresh_secs = u64::MAX;
        assert!(matches!(settings.validate(), Err(IndexerError::Config(_))));

        settings.indexer.pool_refresh_secs = i64::MAX as u64 / 1000 + 1;
        assert!(settings.validate().is_err());

        settings.indexer.pool_refresh_secs = i64::MAX as u64 / 1000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_retry_attempts_is_fatal() {
        let mut settings = settings();
        settings.indexer.retry.max_attempts = 0;
        assert!(matches!(settings.validate(), Err(IndexerError::Config(_))));
    }
}
