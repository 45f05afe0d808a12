#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use poolwatch::api::{bucket_snapshots, Interval};
use poolwatch::db::models::{
    BucketedPrice, Chain, Heartbeat, MarketDataSnapshot, PoolSnapshot, PriceSnapshot, SnapshotKey,
    TokenPriceStats,
};
use poolwatch::db::{MetricsReader, MetricsStore, SnapshotTable};
use poolwatch::error::IndexerError;
use poolwatch::indexer::adapters::{build_pool_snapshot, build_price_snapshot};
use poolwatch::indexer::{ChainAdapter, ChainHead, IndexRun, PoolMetrics, RunSettings};
use poolwatch::sources::{MarketQuote, ReferencePriceSource};
use poolwatch::utils::{ChangeDeduplicator, RetryExecutor, RetryPolicy};

pub const T0_SECS: i64 = 1_700_000_000;

pub fn at_minutes(minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(T0_SECS + minutes * 60, 0).unwrap()
}

pub fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryPolicy::new(2, Duration::from_millis(1), 1.0)).unwrap()
}

// ==================== Store ====================

/// Vec-backed store implementing both storage seams.
#[derive(Default)]
pub struct MemoryStore {
    pub prices: Mutex<Vec<PriceSnapshot>>,
    pub pools: Mutex<Vec<PoolSnapshot>>,
    pub market: Mutex<Vec<MarketDataSnapshot>>,
    pub heartbeats: Mutex<HashMap<String, Heartbeat>>,
    pub fail_inserts: AtomicBool,
    pub fail_lookups: AtomicBool,
    pub fail_stats: AtomicBool,
    pub insert_calls: AtomicUsize,
    pub reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn price_count(&self) -> usize {
        self.prices.lock().unwrap().len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.lock().unwrap().len()
    }

    pub fn market_rows(&self) -> Vec<MarketDataSnapshot> {
        self.market.lock().unwrap().clone()
    }

    pub fn heartbeat(&self, job: &str) -> Option<Heartbeat> {
        self.heartbeats.lock().unwrap().get(job).cloned()
    }

    fn insert<T: Clone>(&self, target: &Mutex<Vec<T>>, rows: &[T]) -> anyhow::Result<u64> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset by peer"));
        }
        target.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    fn check_lookup(&self) -> anyhow::Result<()> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(anyhow!("statement timeout"));
        }
        Ok(())
    }

    fn latest_market(&self) -> Option<MarketDataSnapshot> {
        self.market
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|row| row.timestamp)
            .cloned()
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn latest_price_snapshot(
        &self,
        key: &SnapshotKey,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        self.check_lookup()?;
        Ok(self
            .prices
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.key() == *key)
            .max_by_key(|row| row.timestamp)
            .cloned())
    }

    async fn latest_pool_snapshot(&self, key: &SnapshotKey) -> anyhow::Result<Option<PoolSnapshot>> {
        self.check_lookup()?;
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.key() == *key)
            .max_by_key(|row| row.timestamp)
            .cloned())
    }

    async fn latest_pool_snapshot_timestamp(&self) -> anyhow::Result<Option<i64>> {
        self.check_lookup()?;
        Ok(self.pools.lock().unwrap().iter().map(|row| row.timestamp).max())
    }

    async fn latest_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>> {
        self.check_lookup()?;
        Ok(self.latest_market())
    }

    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> anyhow::Result<u64> {
        self.insert(&self.prices, snapshots)
    }

    async fn insert_pool_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<u64> {
        self.insert(&self.pools, snapshots)
    }

    async fn insert_market_data(&self, records: &[MarketDataSnapshot]) -> anyhow::Result<u64> {
        self.insert(&self.market, records)
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> anyhow::Result<()> {
        self.heartbeats
            .lock()
            .unwrap()
            .insert(heartbeat.job.clone(), heartbeat.clone());
        Ok(())
    }

    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>> {
        Ok(self.heartbeat(job))
    }

    async fn prune_before(&self, table: SnapshotTable, cutoff_ms: i64) -> anyhow::Result<u64> {
        fn prune<T>(rows: &Mutex<Vec<T>>, keep: impl Fn(&T) -> bool) -> u64 {
            let mut rows = rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| keep(row));
            (before - rows.len()) as u64
        }

        Ok(match table {
            SnapshotTable::PriceSnapshots => prune(&self.prices, |r| r.timestamp >= cutoff_ms),
            SnapshotTable::PoolSnapshots => prune(&self.pools, |r| r.timestamp >= cutoff_ms),
            SnapshotTable::MarketData => prune(&self.market, |r| r.timestamp >= cutoff_ms),
        })
    }

    async fn oldest_timestamp(&self, table: SnapshotTable) -> anyhow::Result<Option<i64>> {
        Ok(match table {
            SnapshotTable::PriceSnapshots => {
                self.prices.lock().unwrap().iter().map(|r| r.timestamp).min()
            },
            SnapshotTable::PoolSnapshots => {
                self.pools.lock().unwrap().iter().map(|r| r.timestamp).min()
            },
            SnapshotTable::MarketData => {
                self.market.lock().unwrap().iter().map(|r| r.timestamp).min()
            },
        })
    }
}

#[async_trait]
impl MetricsReader for MemoryStore {
    async fn bucketed_prices(
        &self,
        tokens: &[String],
        interval: Interval,
        limit: u32,
    ) -> anyhow::Result<Vec<BucketedPrice>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.prices.lock().unwrap();
        Ok(bucket_snapshots(&rows, tokens, interval, limit))
    }

    async fn recent_pool_snapshots(
        &self,
        token_address: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut rows: Vec<PoolSnapshot> = self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.token_address == token_address)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn price_window_stats(
        &self,
        tokens: &[String],
        since_ms: i64,
    ) -> anyhow::Result<Vec<TokenPriceStats>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats.load(Ordering::SeqCst) {
            anyhow::bail!("stats query timed out");
        }
        let prices = self.prices.lock().unwrap();

        Ok(tokens
            .iter()
            .filter_map(|token| {
                let window: Vec<f64> = prices
                    .iter()
                    .filter(|row| row.token_address == *token && row.timestamp >= since_ms)
                    .map(|row| row.price)
                    .collect();
                if window.is_empty() {
                    return None;
                }
                Some(TokenPriceStats {
                    token_address: token.clone(),
                    average_price: window.iter().sum::<f64>() / window.len() as f64,
                    high: window.iter().copied().fold(f64::MIN, f64::max),
                    low: window.iter().copied().fold(f64::MAX, f64::min),
                })
            })
            .collect())
    }

    async fn current_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest_market())
    }

    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>> {
        Ok(self.heartbeat(job))
    }
}

// ==================== Sources ====================

pub struct FakeAdapter {
    pub chain: Chain,
    pub price: Mutex<f64>,
    pub fail_head: AtomicBool,
    pub fail_price: AtomicBool,
    pub fail_pool: AtomicBool,
    pub head_delay: Duration,
    pub pool_calls: AtomicUsize,
    /// Head timestamp follows the run's clock, set by the test.
    pub now: Mutex<DateTime<Utc>>,
}

impl FakeAdapter {
    pub fn new(chain: Chain, price: f64) -> Arc<Self> {
        Arc::new(Self {
            chain,
            price: Mutex::new(price),
            fail_head: AtomicBool::new(false),
            fail_price: AtomicBool::new(false),
            fail_pool: AtomicBool::new(false),
            head_delay: Duration::ZERO,
            pool_calls: AtomicUsize::new(0),
            now: Mutex::new(at_minutes(0)),
        })
    }

    pub fn slow(chain: Chain, price: f64, head_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            chain,
            price: Mutex::new(price),
            fail_head: AtomicBool::new(false),
            fail_price: AtomicBool::new(false),
            fail_pool: AtomicBool::new(false),
            head_delay,
            pool_calls: AtomicUsize::new(0),
            now: Mutex::new(at_minutes(0)),
        })
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl ChainAdapter for FakeAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn chain_head(&self) -> Result<ChainHead, IndexerError> {
        if !self.head_delay.is_zero() {
            tokio::time::sleep(self.head_delay).await;
        }
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(IndexerError::RetryExhausted {
                operation: format!("[{}] chain head", self.chain),
                attempts: 2,
                last: anyhow!("connection refused"),
            });
        }
        let now = *self.now.lock().unwrap();
        Ok(ChainHead {
            block_or_slot: 1_000 + (now.timestamp() - T0_SECS) as u64,
            timestamp_ms: now.timestamp_millis(),
        })
    }

    async fn total_supply(&self) -> Result<u128, IndexerError> {
        Ok(2_000_000_000_000)
    }

    async fn fetch_pool_snapshot(
        &self,
        native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
        total_supply: u128,
    ) -> Result<PoolSnapshot, IndexerError> {
        self.pool_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pool.load(Ordering::SeqCst) {
            return Err(IndexerError::derivation("pool stats", "tvlUsdc is missing"));
        }
        let price = *self.price.lock().unwrap();
        let metrics = PoolMetrics {
            price,
            tvl_usd: 100_000.0,
            volume_usd: native_price,
            volatility: native_price / 100_000.0,
        };
        let supply = poolwatch::indexer::normalize_supply(total_supply, 6)?;
        Ok(build_pool_snapshot(self.chain, block_or_slot, timestamp_ms, metrics, supply, 1_234))
    }

    async fn fetch_price_snapshot(
        &self,
        _native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
    ) -> Result<PriceSnapshot, IndexerError> {
        if self.fail_price.load(Ordering::SeqCst) {
            return Err(IndexerError::derivation("pool stats", "token1Price is missing"));
        }
        let price = *self.price.lock().unwrap();
        Ok(build_price_snapshot(self.chain, block_or_slot, timestamp_ms, price))
    }
}

pub struct FakeReference {
    pub fail_native: AtomicBool,
    pub fail_market: AtomicBool,
    pub market_price: Mutex<f64>,
    pub native_calls: AtomicUsize,
}

impl FakeReference {
    pub fn new(market_price: f64) -> Arc<Self> {
        Arc::new(Self {
            fail_native: AtomicBool::new(false),
            fail_market: AtomicBool::new(false),
            market_price: Mutex::new(market_price),
            native_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_market_price(&self, price: f64) {
        *self.market_price.lock().unwrap() = price;
    }
}

#[async_trait]
impl ReferencePriceSource for FakeReference {
    async fn native_price_usd(&self, symbol: &str) -> anyhow::Result<f64> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_native.load(Ordering::SeqCst) {
            return Err(anyhow!("429 Too Many Requests"));
        }
        match symbol {
            "ETH" => Ok(2_500.0),
            "SOL" => Ok(150.0),
            other => Err(anyhow!("unknown symbol {}", other)),
        }
    }

    async fn market_quote(&self) -> anyhow::Result<MarketQuote> {
        if self.fail_market.load(Ordering::SeqCst) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(MarketQuote {
            price: *self.market_price.lock().unwrap(),
            circulating_supply: 1_600_000.0,
            volume_24h: 40_000.0,
        })
    }
}

// ==================== Wiring ====================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub reference: Arc<FakeReference>,
    pub adapters: Vec<Arc<FakeAdapter>>,
    pub run: IndexRun,
}

impl Harness {
    pub fn new(adapters: Vec<Arc<FakeAdapter>>) -> Self {
        Self::with_settings(adapters, RunSettings {
            pool_refresh_ms: 3_600_000,
            seeds: Default::default(),
        })
    }

    pub fn with_settings(adapters: Vec<Arc<FakeAdapter>>, settings: RunSettings) -> Self {
        let store = MemoryStore::new();
        let reference = FakeReference::new(0.05);
        let chain_adapters: Vec<Arc<dyn ChainAdapter>> = adapters
            .iter()
            .map(|adapter| adapter.clone() as Arc<dyn ChainAdapter>)
            .collect();

        let run = IndexRun::new(
            chain_adapters,
            reference.clone(),
            store.clone(),
            fast_retry(),
            ChangeDeduplicator::default(),
            settings,
        );

        Self {
            store,
            reference,
            adapters,
            run,
        }
    }

    pub fn all_chains() -> Self {
        Self::new(vec![
            FakeAdapter::new(Chain::Base, 0.051),
            FakeAdapter::new(Chain::Ethereum, 0.050),
            FakeAdapter::new(Chain::Solana, 0.049),
        ])
    }

    /// Move every adapter's clock to `now`.
    pub fn set_now(&self, now: DateTime<Utc>) {
        for adapter in &self.adapters {
            adapter.set_now(now);
        }
    }

    pub fn adapter(&self, chain: Chain) -> &Arc<FakeAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.chain == chain)
            .unwrap()
    }
}
