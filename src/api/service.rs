use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::api::aggregator::{round_timestamp_to_interval, Interval};
use crate::api::cache::ResultCache;
use crate::config::ApiSettings;
use crate::db::models::{Chain, MarketDataSnapshot, PoolSnapshot, TokenPriceStats};
use crate::db::MetricsReader;
use crate::indexer::{AlertState, HealthMonitor, HealthStatus, INDEX_RUN_JOB};

/// Pool rows returned per chain when no limit is given.
pub const DEFAULT_POOL_LIMIT: u32 = 1;

const CACHE_CAPACITY: u64 = 1_000;

/// One value per tracked chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerChain<T> {
    pub base: T,
    pub ethereum: T,
    pub solana: T,
}

impl<T> PerChain<T> {
    pub fn get(&self, chain: Chain) -> &T {
        match chain {
            Chain::Base => &self.base,
            Chain::Ethereum => &self.ethereum,
            Chain::Solana => &self.solana,
        }
    }

    pub fn get_mut(&mut self, chain: Chain) -> &mut T {
        match chain {
            Chain::Base => &mut self.base,
            Chain::Ethereum => &mut self.ethereum,
            Chain::Solana => &mut self.solana,
        }
    }
}

/// Average price of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub chain: Chain,
    pub exchange: String,
    pub pool_address: String,
    pub token_address: String,
    pub price: f64,
    /// Rounded to the interval, unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolView {
    pub chain: Chain,
    pub exchange: String,
    pub pool_address: String,
    pub token_address: String,
    pub block_number: i64,
    /// Unix seconds.
    pub timestamp: i64,
    pub price: f64,
    /// Average price over the market window, 0 without data.
    pub average_price: f64,
    pub circulating_supply: f64,
    pub holders: i64,
    pub market_cap: f64,
    pub tvl_usd: f64,
    pub volume_usd: f64,
    pub volatility: f64,
    /// Pool creation time, unix seconds.
    pub pool_age: i64,
}

impl PoolView {
    fn new(snapshot: PoolSnapshot, average_price: f64) -> Self {
        let pool_age = snapshot.chain.tracked_pool().created_at;
        Self {
            chain: snapshot.chain,
            exchange: snapshot.exchange,
            pool_address: snapshot.pool_address,
            token_address: snapshot.token_address,
            block_number: snapshot.block_number,
            timestamp: snapshot.timestamp.div_euclid(1000),
            price: snapshot.price,
            average_price,
            circulating_supply: snapshot.circulating_supply,
            holders: snapshot.holders,
            market_cap: snapshot.market_cap,
            tvl_usd: snapshot.tvl_usd,
            volume_usd: snapshot.volume_usd,
            volatility: snapshot.volatility,
            pool_age,
        }
    }
}

/// Fields without a market data row yet are 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketView {
    pub all_time_high: f64,
    pub all_time_low: f64,
    pub circulating_supply: f64,
    /// Highest price of any tracked token over the market window, 0 without data.
    pub day_high_price: f64,
    pub day_low_price: f64,
    pub day_volume: f64,
    pub market_cap: f64,
    pub price: f64,
    /// Unix seconds.
    pub timestamp: i64,
}

impl MarketView {
    fn new(snapshot: MarketDataSnapshot, day_high_price: f64, day_low_price: f64) -> Self {
        Self {
            all_time_high: snapshot.all_time_high,
            all_time_low: snapshot.all_time_low,
            circulating_supply: snapshot.circulating_supply,
            day_high_price,
            day_low_price,
            day_volume: snapshot.day_volume,
            market_cap: snapshot.market_cap,
            price: snapshot.price,
            timestamp: snapshot.timestamp.div_euclid(1000),
        }
    }
}

/// Read API over stored snapshots.
///
/// Query results are cached for `api.cache_ttl_secs`; the health check is
/// always evaluated against the latest heartbeat.
pub struct MetricsApi {
    reader: Arc<dyn MetricsReader>,
    settings: ApiSettings,
    monitor: HealthMonitor,
    alerts: Mutex<AlertState>,
    prices: ResultCache<(Interval, u32), PerChain<Vec<PricePoint>>>,
    pools: ResultCache<u32, PerChain<Vec<PoolView>>>,
    market: ResultCache<(), MarketView>,
}

impl MetricsApi {
    pub fn new(reader: Arc<dyn MetricsReader>, settings: ApiSettings) -> Self {
        let monitor = HealthMonitor::from_secs(settings.stale_after_secs, settings.alert_cooldown_secs);
        Self {
            reader,
            settings,
            monitor,
            alerts: Mutex::new(AlertState::default()),
            prices: ResultCache::new(CACHE_CAPACITY),
            pools: ResultCache::new(CACHE_CAPACITY),
            market: ResultCache::new(CACHE_CAPACITY),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.settings.cache_ttl_secs)
    }

    fn tracked_tokens() -> Vec<String> {
        Chain::ALL
            .iter()
            .map(|chain| chain.tracked_pool().token_address.to_string())
            .collect()
    }

    fn market_window_start(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - i64::from(self.settings.market_window_hours) * 3_600_000
    }

    /// Price stats over the market window. A failed lookup yields no stats so
    /// the caller falls back to 0 for every derived field.
    async fn window_stats(&self, now: DateTime<Utc>) -> Vec<TokenPriceStats> {
        match self
            .reader
            .price_window_stats(&Self::tracked_tokens(), self.market_window_start(now))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Price window stats unavailable, using 0: {:#}", e);
                vec![]
            },
        }
    }

    /// Bucketed average prices per chain, newest bucket first. Buckets are
    /// not bounded in time, so a chain that stopped indexing still returns
    /// its last `limit` buckets.
    pub async fn price_snapshots(
        &self,
        interval: Interval,
        limit: Option<u32>,
    ) -> anyhow::Result<PerChain<Vec<PricePoint>>> {
        let limit = limit.unwrap_or(self.settings.default_price_limit);
        if limit == 0 {
            return Ok(PerChain::default());
        }

        self.prices
            .get((interval, limit), self.ttl(), || {
                self.load_price_snapshots(interval, limit)
            })
            .await
    }

    async fn load_price_snapshots(
        &self,
        interval: Interval,
        limit: u32,
    ) -> anyhow::Result<PerChain<Vec<PricePoint>>> {
        let rows = self
            .reader
            .bucketed_prices(&Self::tracked_tokens(), interval, limit)
            .await?;

        let mut result: PerChain<Vec<PricePoint>> = PerChain::default();
        for row in rows {
            let Some(chain) = Chain::from_token_address(&row.token_address) else {
                debug!("Skipping bucket of untracked token {}", row.token_address);
                continue;
            };
            let pool = chain.tracked_pool();

            result.get_mut(chain).push(PricePoint {
                chain,
                exchange: pool.exchange.to_string(),
                pool_address: pool.pool_address.to_string(),
                token_address: row.token_address,
                price: row.price,
                timestamp: round_timestamp_to_interval(row.first_timestamp_ms, interval),
            });
        }

        Ok(result)
    }

    /// Latest pool snapshots per chain, `limit` defaulting to one.
    pub async fn pool_snapshots(
        &self,
        limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PerChain<Vec<PoolView>>> {
        let limit = limit.unwrap_or(DEFAULT_POOL_LIMIT);
        if limit == 0 {
            return Ok(PerChain::default());
        }

        self.pools
            .get(limit, self.ttl(), || self.load_pool_snapshots(limit, now))
            .await
    }

    async fn load_pool_snapshots(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PerChain<Vec<PoolView>>> {
        let averages: FxHashMap<String, f64> = self
            .window_stats(now)
            .await
            .into_iter()
            .map(|stats| (stats.token_address, stats.average_price))
            .collect();

        let mut result: PerChain<Vec<PoolView>> = PerChain::default();
        for chain in Chain::ALL {
            let token_address = chain.tracked_pool().token_address;
            let average_price = averages.get(token_address).copied().unwrap_or(0.0);

            *result.get_mut(chain) = self
                .reader
                .recent_pool_snapshots(token_address, limit)
                .await?
                .into_iter()
                .map(|snapshot| PoolView::new(snapshot, average_price))
                .collect();
        }

        Ok(result)
    }

    /// Latest market data with the day range across all tracked tokens.
    pub async fn market_data(&self, now: DateTime<Utc>) -> anyhow::Result<MarketView> {
        self.market
            .get((), self.ttl(), || self.load_market_data(now))
            .await
    }

    async fn load_market_data(&self, now: DateTime<Utc>) -> anyhow::Result<MarketView> {
        let snapshot = self.reader.current_market_data().await?;
        let stats = self.window_stats(now).await;

        let day_high = stats.iter().map(|s| s.high).reduce(f64::max).unwrap_or(0.0);
        let day_low = stats.iter().map(|s| s.low).reduce(f64::min).unwrap_or(0.0);

        Ok(match snapshot {
            Some(snapshot) => MarketView::new(snapshot, day_high, day_low),
            None => {
                debug!("No market data row yet");
                MarketView {
                    day_high_price: day_high,
                    day_low_price: day_low,
                    ..MarketView::default()
                }
            },
        })
    }

    /// Staleness of the indexing heartbeat. Raises an alert log at most once
    /// per cooldown.
    pub async fn health(&self, now: DateTime<Utc>) -> anyhow::Result<HealthStatus> {
        let last = self.reader.last_heartbeat(INDEX_RUN_JOB).await?;
        let mut alerts = self.alerts.lock().await;
        Ok(self.monitor.evaluate(last.as_ref(), now, &mut alerts))
    }

    /// Drop every cached result.
    pub fn invalidate(&self) {
        self.prices.invalidate_all();
        self.pools.invalidate_all();
        self.market.invalidate_all();
    }
}
